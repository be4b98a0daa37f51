//! Chart routing, lifecycle and plan generation.
//!
//! The [`Engine`] owns a compiled [`Program`](chartgen_template::Program),
//! a generation-keyed route cache and the materialized chart/dimension
//! state, all behind a single read/write lock. An external loader feeds it
//! template specs via [`Engine::load`]; once per collection cycle an
//! external driver calls [`Engine::build_plan`] with a read-only
//! [`SeriesReader`] view of the current samples and applies the returned
//! [`Plan`] to the wire protocol.
//!
//! Everything in this crate is synchronous, in-memory and CPU-bound: there
//! is no I/O and nothing to cancel. `build_plan` is expected to be invoked
//! by a single caller per engine; `load` may happen concurrently and is
//! serialized by the engine lock.

#![warn(missing_docs)]

mod action;
mod autogen;
mod cache;
mod engine;
mod error;
mod labels;
mod naming;
mod planner;
mod reader;
mod route;
mod router;
mod seqguard;
mod state;
mod statsd;

pub use action::{
    ActionKind, CreateChartAction, CreateDimensionAction, DimensionValue, EngineAction,
    InferredDimension, Plan, RemoveChartAction, RemoveDimensionAction, UpdateChartAction,
};
pub use autogen::{AutogenPolicy, DEFAULT_MAX_TYPE_ID_LEN, MIN_TYPE_ID_LEN};
pub use cache::RouteCache;
pub use engine::{Engine, EngineConfig, EngineStats};
pub use error::{EngineError, LoadError, PlanError};
pub use naming::infer_dimension_label_key;
pub use reader::{FlatSeries, FlattenRole, MetricMeta, SeriesMeta, SeriesReader};
pub use route::{RouteBinding, RouteList};
pub use seqguard::{SeqGuard, SeqTransition};
pub use state::should_expire;
pub use statsd::{CounterMetric, EngineCounters, NoopTelemetry, Telemetry};
