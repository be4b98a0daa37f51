//! The engine facade: program lifecycle, locking and statistics.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chartgen_template::{Program, TemplateSpec, compile};
use parking_lot::RwLock;

use crate::action::Plan;
use crate::autogen::{AutogenPolicy, MIN_TYPE_ID_LEN};
use crate::cache::RouteCache;
use crate::error::{EngineError, LoadError, PlanError};
use crate::planner;
use crate::reader::SeriesReader;
use crate::router::MatchIndex;
use crate::seqguard::SeqGuard;
use crate::state::MaterializedState;
use crate::statsd::{NoopTelemetry, Telemetry};

/// Engine construction options.
#[derive(Clone)]
pub struct EngineConfig {
    /// Fallback chart synthesis for unmatched series.
    pub autogen: AutogenPolicy,
    /// Counter sink; discards by default.
    pub telemetry: Arc<dyn Telemetry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autogen: AutogenPolicy::default(),
            telemetry: Arc::new(NoopTelemetry),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("autogen", &self.autogen)
            .finish_non_exhaustive()
    }
}

/// Cumulative engine counters, readable at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Series whose routes came from the cache.
    pub route_cache_hits: u64,
    /// Series whose routes were recomputed.
    pub route_cache_misses: u64,
    /// Fallback routes synthesized for unmatched series.
    pub autogen_routes_built: u64,
    /// Committed planning cycles.
    pub plans_built: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCells {
    pub route_cache_hits: AtomicU64,
    pub route_cache_misses: AtomicU64,
    pub autogen_routes_built: AtomicU64,
    pub plans_built: AtomicU64,
}

impl StatsCells {
    fn snapshot(&self) -> EngineStats {
        EngineStats {
            route_cache_hits: self.route_cache_hits.load(Ordering::Relaxed),
            route_cache_misses: self.route_cache_misses.load(Ordering::Relaxed),
            autogen_routes_built: self.autogen_routes_built.load(Ordering::Relaxed),
            plans_built: self.plans_built.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct Inner {
    program: Option<Arc<Program>>,
    index: Option<Arc<MatchIndex>>,
    state: MaterializedState,
    guard: SeqGuard,
}

/// The chart engine.
///
/// Compiles templates into an immutable program, routes flattened series
/// to chart dimensions and turns each collection cycle into an ordered
/// action [`Plan`]. Safe to share behind an `Arc`; loading and planning
/// serialize on an internal lock.
pub struct Engine {
    config: EngineConfig,
    cache: RouteCache,
    stats: StatsCells,
    inner: RwLock<Inner>,
}

impl Engine {
    /// Creates an engine with the given options.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if config.autogen.max_type_id_len < MIN_TYPE_ID_LEN {
            return Err(EngineError::InvalidConfig {
                reason: format!("max_type_id_len must be at least {MIN_TYPE_ID_LEN}"),
            });
        }
        Ok(Self {
            config,
            cache: RouteCache::new(),
            stats: StatsCells::default(),
            inner: RwLock::new(Inner::default()),
        })
    }

    /// Compiles and activates a template spec under the given revision.
    ///
    /// Activation is atomic: the new program, an empty materialized state
    /// and an empty route cache swap in together. A compile error leaves
    /// the currently active program untouched.
    pub fn load(&self, spec: &TemplateSpec, revision: u64) -> Result<(), LoadError> {
        let program = compile(spec, revision)?;
        let index = MatchIndex::build(&program);

        let mut inner = self.inner.write();
        inner.program = Some(Arc::new(program));
        inner.index = Some(Arc::new(index));
        inner.state = MaterializedState::default();
        inner.guard = SeqGuard::new();
        drop(inner);
        self.cache.clear();

        chartgen_log::info!(revision, "activated chart template program");
        Ok(())
    }

    /// True once a program has been loaded.
    pub fn ready(&self) -> bool {
        self.inner.read().program.is_some()
    }

    /// The active program, if any.
    pub fn program(&self) -> Option<Arc<Program>> {
        self.inner.read().program.clone()
    }

    /// The metric names the active program declares visible, sorted.
    pub fn metric_names(&self) -> Vec<String> {
        self.inner
            .read()
            .program
            .as_ref()
            .map(|program| program.metric_names().to_vec())
            .unwrap_or_default()
    }

    /// Builds the action plan for the reader's current cycle.
    ///
    /// Commits the cycle to the materialized state on success. On error
    /// nothing is emitted and nothing is committed.
    pub fn build_plan(&self, reader: &dyn SeriesReader) -> Result<Plan, PlanError> {
        let mut inner = self.inner.write();
        let Inner {
            program,
            index,
            state,
            guard,
        } = &mut *inner;
        let (Some(program), Some(index)) = (program.as_ref(), index.as_ref()) else {
            return Err(PlanError::NoProgram);
        };
        planner::build_plan(
            program,
            index,
            reader,
            &self.cache,
            state,
            guard,
            &self.config,
            &self.stats,
        )
    }

    /// A snapshot of the cumulative counters.
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("ready", &self.ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chartgen_template::CompileError;

    use super::*;

    fn spec(value: serde_json::Value) -> TemplateSpec {
        serde_json::from_value(value).unwrap()
    }

    fn valid_spec() -> TemplateSpec {
        spec(serde_json::json!({
            "version": "v1",
            "groups": [{
                "metrics": ["m_total"],
                "charts": [{
                    "id": "m_chart",
                    "context": "m.ctx",
                    "units": "events/s",
                    "dimensions": [{"selector": "m_total", "name": "total"}],
                }],
            }],
        }))
    }

    #[test]
    fn test_rejects_tiny_type_id_budget() {
        let config = EngineConfig {
            autogen: AutogenPolicy {
                enabled: true,
                max_type_id_len: 3,
                ..AutogenPolicy::default()
            },
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::new(config),
            Err(EngineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_failed_load_keeps_the_active_program() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        engine.load(&valid_spec(), 1).unwrap();
        assert!(engine.ready());
        assert_eq!(engine.metric_names(), ["m_total"]);

        let bad = spec(serde_json::json!({
            "version": "v1",
            "groups": [{
                "metrics": ["m_total"],
                "charts": [{
                    "id": "m_chart",
                    "context": "m.ctx",
                    "units": "events/s",
                    "dimensions": [],
                }],
            }],
        }));
        let err = engine.load(&bad, 2).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Compile(CompileError::EmptyChart { .. })
        ));

        let program = engine.program().unwrap();
        assert_eq!(program.revision, 1);
    }

    #[test]
    fn test_plan_without_program_fails() {
        struct NoSeries;
        impl SeriesReader for NoSeries {
            fn build_seq(&self) -> u64 {
                1
            }
            fn flatten(&self) -> Vec<crate::reader::FlatSeries> {
                Vec::new()
            }
            fn metric_meta(&self, _name: &str) -> Option<crate::reader::MetricMeta> {
                None
            }
        }

        let engine = Engine::new(EngineConfig::default()).unwrap();
        assert!(matches!(
            engine.build_plan(&NoSeries),
            Err(PlanError::NoProgram)
        ));
    }
}
