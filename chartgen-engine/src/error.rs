use chartgen_template::CompileError;
use thiserror::Error;

use crate::reader::FlattenRole;

/// An error constructing an [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine configuration is rejected.
    #[error("invalid engine config: {reason}")]
    InvalidConfig {
        /// Human readable rejection reason.
        reason: String,
    },
}

/// An error loading a template specification into the engine.
///
/// A failed load leaves the previously active program untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The template spec did not compile.
    #[error("template compilation failed")]
    Compile(#[from] CompileError),
}

/// An error building a plan.
///
/// Any plan error aborts the cycle: no actions are emitted and no
/// materialized state is mutated, so the next successful cycle starts
/// from the last committed state.
#[derive(Debug, Error)]
pub enum PlanError {
    /// No program has been loaded yet.
    #[error("no program loaded")]
    NoProgram,
    /// A route references a template chart missing from the active program.
    #[error("route references unknown template chart {template_id:?}")]
    UnknownTemplateChart {
        /// The dangling template chart ID.
        template_id: String,
    },
    /// A dimension name cannot be inferred for this series shape.
    #[error("cannot infer a dimension name for series {series:?} with flatten role {role:?}")]
    UnsupportedFlattenRole {
        /// The metric name of the offending series.
        series: String,
        /// The series' flatten role.
        role: FlattenRole,
    },
}
