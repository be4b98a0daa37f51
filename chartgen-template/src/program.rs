//! The immutable, versioned chart program produced by the compiler.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::selector::Selector;

/// A series label set, ordered for deterministic iteration.
pub type Labels = BTreeMap<String, String>;

/// Default chart expiry when the template omits a lifecycle block.
pub const DEFAULT_CHART_EXPIRE_CYCLES: u64 = 5;

/// Default dashboard priority for template charts.
pub const DEFAULT_PRIORITY: u32 = 70_000;

/// An immutable compiled template.
///
/// Created once per successful [`compile`](crate::compile) call, replaced
/// wholesale on reload and never mutated afterwards.
#[derive(Debug)]
pub struct Program {
    /// The template spec version string.
    pub version: String,
    /// Monotonic generation id supplied by the loader.
    pub revision: u64,
    metric_names: Vec<String>,
    charts: Vec<Chart>,
}

impl Program {
    pub(crate) fn new(
        version: String,
        revision: u64,
        metric_names: Vec<String>,
        charts: Vec<Chart>,
    ) -> Self {
        debug_assert!(metric_names.is_sorted());
        Self {
            version,
            revision,
            metric_names,
            charts,
        }
    }

    /// The sorted list of metric names declared visible by the template.
    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    /// The compiled charts, in template order.
    pub fn charts(&self) -> &[Chart] {
        &self.charts
    }

    /// Looks up a chart by its stable template ID.
    pub fn chart(&self, template_id: &str) -> Option<&Chart> {
        self.charts
            .iter()
            .find(|chart| chart.template_id == template_id)
    }
}

/// One compiled chart definition.
#[derive(Debug)]
pub struct Chart {
    /// Stable compiler-assigned path, e.g. `g0.c1`.
    pub template_id: String,
    /// Presentation metadata.
    pub meta: ChartMeta,
    /// Instance identity rule.
    pub identity: ChartIdentity,
    /// Label promotion policy.
    pub labels: LabelPolicy,
    /// Instance and dimension lifecycle policy.
    pub lifecycle: Lifecycle,
    /// Compiled dimension rules, in template order.
    pub dimensions: Vec<DimensionRule>,
}

/// Chart presentation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartMeta {
    /// Human readable title.
    pub title: String,
    /// Unit string shown on the dashboard.
    pub units: String,
    /// Dashboard family (section).
    pub family: String,
    /// Dotted context string.
    pub context: String,
    /// Value interpretation.
    pub algorithm: Algorithm,
    /// Rendering style.
    pub chart_type: ChartType,
    /// Dashboard ordering priority.
    pub priority: u32,
}

/// How dimension values are interpreted by the dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// The value is used as-is.
    #[default]
    Absolute,
    /// The value is differentiated against the previous sample.
    Incremental,
}

impl Algorithm {
    /// Returns the wire-protocol name of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart rendering style.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    /// One line per dimension.
    #[default]
    Line,
    /// Filled area.
    Area,
    /// Stacked areas.
    Stacked,
    /// Heatmap, used for histogram buckets.
    Heatmap,
}

impl ChartType {
    /// Returns the wire-protocol name of the chart type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Area => "area",
            Self::Stacked => "stacked",
            Self::Heatmap => "heatmap",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label promotion policy of one chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    /// Which labels qualify for promotion to chart scope.
    pub mode: PromotionMode,
    /// Keys that never get promoted: selector-constrained keys and
    /// dimension-key labels.
    pub excluded: BTreeSet<String>,
}

/// How per-series labels are promoted to chart-instance scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionMode {
    /// Any non-excluded, non-identity label with a value identical across
    /// all series routed to the instance.
    Auto,
    /// Only the listed labels qualify, under the same equal-value rule.
    Explicit(Vec<String>),
}

/// Instance and dimension lifecycle policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    /// Cycles without observation before a chart instance is removed.
    /// Zero disables expiry.
    pub expire_after_cycles: u64,
    /// Soft cap on materialized instances per template chart.
    pub max_instances: Option<usize>,
    /// Cycles without observation before a dimension is removed.
    /// Zero disables expiry.
    pub dim_expire_after_cycles: u64,
    /// Soft cap on dimensions per chart instance.
    pub max_dims: Option<usize>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            expire_after_cycles: DEFAULT_CHART_EXPIRE_CYCLES,
            max_instances: None,
            dim_expire_after_cycles: 0,
            max_dims: None,
        }
    }
}

/// One compiled dimension rule.
#[derive(Debug)]
pub struct DimensionRule {
    /// The compiled series selector.
    pub selector: Selector,
    /// How the dimension name is resolved per series.
    pub naming: DimensionNaming,
    /// Hidden on the dashboard by default.
    pub hidden: bool,
    /// Effective value interpretation.
    pub algorithm: Algorithm,
    /// Value multiplier.
    pub multiplier: i64,
    /// Value divisor.
    pub divisor: i64,
    /// True iff the rendered dimension name can vary across cycles.
    pub dynamic: bool,
}

/// Dimension naming mode; exactly one per rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionNaming {
    /// A literal name.
    Static(String),
    /// The value of the named label.
    FromLabel(String),
    /// The label key is derived from the series' flatten role
    /// (histogram buckets, summary quantiles, state-set states).
    Infer,
}

/// A chart's identity rule: how per-series label values turn a template
/// chart into materialized instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartIdentity {
    /// Literal ID prefix; phase-1 syntax forbids placeholders here.
    pub id_template: String,
    /// Instance label selectors, in declared order.
    pub tokens: Vec<InstanceToken>,
}

impl ChartIdentity {
    /// True iff the identity has no instance tokens, meaning exactly one
    /// chart materializes for the template chart.
    pub fn is_static(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// One `instances.by_labels` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceToken {
    /// An explicit label key; required for the series to materialize.
    Key(String),
    /// Include all remaining labels, lexicographically.
    IncludeAll,
    /// Exclude one key from the wildcard expansion.
    Exclude(String),
}
