//! The validated template tree handed over by the external parser.
//!
//! The textual format (YAML) and its schema validation are owned by the
//! surrounding collector framework; this module only models the already
//! parsed tree. All fields are optional on the wire and default to empty,
//! the compiler decides which omissions are errors.

use serde::{Deserialize, Serialize};

use crate::program::{Algorithm, ChartType};

/// A full template specification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateSpec {
    /// Spec syntax version, e.g. `v1`.
    pub version: String,
    /// Top level groups.
    pub groups: Vec<GroupSpec>,
}

/// A group of charts sharing family and metric visibility.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupSpec {
    /// Dashboard family, inherited by nested groups and charts.
    pub family: String,
    /// Metric names (or glob patterns) visible to selectors in this group
    /// and its nested groups.
    pub metrics: Vec<String>,
    /// Charts declared directly in this group.
    pub charts: Vec<ChartSpec>,
    /// Nested groups.
    pub groups: Vec<GroupSpec>,
}

/// One chart declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChartSpec {
    /// Chart ID; defaults to the context when empty.
    pub id: String,
    /// Human readable title.
    pub title: String,
    /// Dotted context string.
    pub context: String,
    /// Unit string.
    pub units: String,
    /// Family override; defaults to the group family.
    pub family: String,
    /// Rendering style.
    #[serde(rename = "type")]
    pub chart_type: Option<ChartType>,
    /// Explicit algorithm; inferred from dimension metrics when absent.
    pub algorithm: Option<Algorithm>,
    /// Dashboard ordering priority.
    pub priority: Option<u32>,
    /// Per-series instantiation rule.
    pub instances: InstancesSpec,
    /// Label promotion configuration.
    pub labels: LabelsSpec,
    /// Lifecycle configuration.
    pub lifecycle: LifecycleSpec,
    /// Dimension declarations.
    pub dimensions: Vec<DimensionSpec>,
}

/// Per-series instantiation rule.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InstancesSpec {
    /// Instance label tokens: a label key, `*` for all remaining labels,
    /// or `!key` to exclude one key from the wildcard.
    pub by_labels: Vec<String>,
}

/// Label promotion configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelsSpec {
    /// Labels to promote to chart scope. Empty selects automatic
    /// intersection promotion.
    pub promote: Vec<String>,
}

/// Chart lifecycle configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleSpec {
    /// Cycles without observation before an instance is removed.
    pub expire_after_cycles: Option<u64>,
    /// Soft cap on materialized instances of this chart.
    pub max_instances: Option<usize>,
    /// Dimension lifecycle.
    pub dimensions: DimLifecycleSpec,
}

/// Dimension lifecycle configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DimLifecycleSpec {
    /// Cycles without observation before a dimension is removed.
    pub expire_after_cycles: Option<u64>,
    /// Soft cap on dimensions per chart instance.
    pub max_dims: Option<usize>,
}

/// One dimension declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DimensionSpec {
    /// Series selector source text.
    pub selector: String,
    /// Static dimension name.
    pub name: Option<String>,
    /// Read the dimension name from this label.
    pub name_from_label: Option<String>,
    /// Hidden on the dashboard by default.
    pub hidden: bool,
    /// Value multiplier; defaults to 1.
    pub multiplier: Option<i64>,
    /// Value divisor; defaults to 1.
    pub divisor: Option<i64>,
    /// Per-dimension algorithm override.
    pub algorithm: Option<Algorithm>,
}
