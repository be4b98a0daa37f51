//! Chart template model, compiler and identity rendering.
//!
//! This crate owns the declarative side of chart generation: the validated
//! template tree handed over by the external parser ([`TemplateSpec`]), the
//! selector syntax used to bind metric series to dimensions ([`Selector`]),
//! and the compiler that turns a template into an immutable [`Program`].
//!
//! A [`Program`] is created once per successful [`compile`] call, replaced
//! wholesale on reload and never mutated. Rendering a per-series chart
//! instance ID from a program chart's identity rule is a pure function as
//! well, see [`render_chart_id`].

#![warn(missing_docs)]

mod compile;
mod error;
mod identity;
mod pattern;
mod program;
mod selector;
mod spec;

pub use compile::compile;
pub use error::{CompileError, SelectorError};
pub use identity::{RenderedIdentity, render_chart_id, sanitize_id_value};
pub use program::{
    Algorithm, Chart, ChartIdentity, ChartMeta, ChartType, DEFAULT_CHART_EXPIRE_CYCLES,
    DEFAULT_PRIORITY, DimensionNaming, DimensionRule, InstanceToken, LabelPolicy, Labels,
    Lifecycle, Program, PromotionMode,
};
pub use selector::Selector;
pub use spec::{
    ChartSpec, DimLifecycleSpec, DimensionSpec, GroupSpec, InstancesSpec, LabelsSpec,
    LifecycleSpec, TemplateSpec,
};
