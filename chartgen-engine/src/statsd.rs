//! Counter hooks for operational visibility.
//!
//! The engine reports a handful of counters through a caller-provided
//! [`Telemetry`] sink; the embedding agent decides where they go. The
//! default sink discards everything.

/// A metric that counts discrete occurrences.
pub trait CounterMetric {
    /// Returns the constant name of the counter.
    fn name(&self) -> &'static str;
}

/// Counters emitted by the chart engine.
#[derive(Debug, Clone, Copy)]
pub enum EngineCounters {
    /// A series' routes were served from the route cache.
    RouteCacheHit,
    /// A series' routes had to be recomputed.
    RouteCacheMiss,
    /// A fallback route was synthesized for an unmatched series.
    AutogenRouteBuilt,
    /// A plan was built and committed.
    PlanBuilt,
    /// A new chart instance was dropped by the instance cap.
    InstanceCapDropped,
    /// A new dimension was dropped by the dimension cap.
    DimensionCapDropped,
}

impl CounterMetric for EngineCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::RouteCacheHit => "chartengine.route_cache.hit",
            Self::RouteCacheMiss => "chartengine.route_cache.miss",
            Self::AutogenRouteBuilt => "chartengine.autogen.route_built",
            Self::PlanBuilt => "chartengine.plan.built",
            Self::InstanceCapDropped => "chartengine.cap.instance_dropped",
            Self::DimensionCapDropped => "chartengine.cap.dimension_dropped",
        }
    }
}

/// A sink for engine counters.
pub trait Telemetry: Send + Sync {
    /// Adds `value` occurrences to the given counter.
    fn count(&self, counter: &dyn CounterMetric, value: u64);
}

/// A [`Telemetry`] sink that discards everything.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn count(&self, _counter: &dyn CounterMetric, _value: u64) {}
}
