//! Resolved routes from one series to chart dimensions.

use std::collections::BTreeSet;

use chartgen_template::{Algorithm, ChartMeta, Labels, Lifecycle};
use smallvec::SmallVec;

/// All routes of one series. Nearly every series maps to one or two
/// dimensions, so the list lives inline.
pub type RouteList = SmallVec<[RouteBinding; 4]>;

/// One resolved mapping from a series to a dimension of a chart instance.
///
/// A binding is self-contained enough to replay from the route cache
/// without re-running selectors: identity rendering and dimension naming
/// already happened. Chart-level label policy is looked up from the active
/// program via `template_id` for template charts; fallback bindings carry
/// their exclusions inline.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteBinding {
    /// The compiled template chart ID, or a synthetic `autogen:` ID.
    pub template_id: String,
    /// The rendered chart instance ID.
    pub chart_id: String,
    /// Index of the dimension rule within the template chart. Fallback
    /// bindings use 0.
    pub dim_index: usize,
    /// The resolved dimension name.
    pub dim_name: String,
    /// The label key the dimension name was read from, for dynamic names.
    pub label_key: Option<String>,
    /// True when the name came from structural inference rather than an
    /// explicit label reference.
    pub inferred: bool,
    /// Hidden on the dashboard by default.
    pub hidden: bool,
    /// Value interpretation.
    pub algorithm: Algorithm,
    /// Value multiplier.
    pub multiplier: i64,
    /// Value divisor.
    pub divisor: i64,
    /// True when the dimension materializes per observed name instead of
    /// exactly once.
    pub dynamic: bool,
    /// True when this binding was synthesized by the fallback path.
    pub autogen: bool,
    /// Presentation metadata of the chart instance.
    pub meta: ChartMeta,
    /// Lifecycle configuration of the chart instance.
    pub lifecycle: Lifecycle,
    /// The instance-key labels that rendered the chart ID.
    pub instance_labels: Labels,
    /// Label keys excluded from promotion, for fallback bindings.
    pub promote_excluded: BTreeSet<String>,
}
