//! The plan action model.
//!
//! A [`Plan`] is the only output of a planning cycle: an ordered list of
//! actions the applier replays against the wire protocol. The applier
//! relies on [`ActionKind`] ordering only within a single chart; across
//! charts the plan is grouped per chart in ascending chart ID.

use chartgen_template::{Algorithm, ChartMeta, Labels};

/// The kind of a plan action.
///
/// The derived order is the applier's per-chart contract: creations before
/// updates before removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    /// Materialize a chart instance.
    CreateChart,
    /// Materialize a dimension on an existing chart instance.
    CreateDimension,
    /// Push this cycle's dimension values to a chart instance.
    UpdateChart,
    /// Remove a dimension from a chart instance.
    RemoveDimension,
    /// Remove a chart instance.
    RemoveChart,
}

/// Materializes a chart instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateChartAction {
    /// The rendered chart instance ID.
    pub chart_id: String,
    /// The compiled template chart this instance was rendered from, or the
    /// synthetic fallback template ID.
    pub template_id: String,
    /// Presentation metadata.
    pub meta: ChartMeta,
    /// Chart-scope labels: the instance-key labels plus promoted labels.
    pub labels: Labels,
}

/// Materializes a dimension on an existing chart instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDimensionAction {
    /// The owning chart instance ID.
    pub chart_id: String,
    /// The dimension name.
    pub name: String,
    /// Hidden on the dashboard by default.
    pub hidden: bool,
    /// Value interpretation.
    pub algorithm: Algorithm,
    /// Value multiplier applied by the emission layer.
    pub multiplier: i64,
    /// Value divisor applied by the emission layer.
    pub divisor: i64,
}

/// One dimension value within an update.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionValue {
    /// The dimension name.
    pub name: String,
    /// The raw collected value, or `None` when the dimension was not
    /// observed this cycle and its value slot must be emptied.
    pub value: Option<f64>,
}

/// Pushes this cycle's dimension values to a chart instance.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateChartAction {
    /// The chart instance ID.
    pub chart_id: String,
    /// All live dimensions of the instance in name order.
    pub values: Vec<DimensionValue>,
}

/// Removes a dimension from a chart instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveDimensionAction {
    /// The owning chart instance ID.
    pub chart_id: String,
    /// The dimension name.
    pub name: String,
}

/// Removes a chart instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveChartAction {
    /// The chart instance ID.
    pub chart_id: String,
}

/// One action in a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// See [`CreateChartAction`].
    CreateChart(CreateChartAction),
    /// See [`CreateDimensionAction`].
    CreateDimension(CreateDimensionAction),
    /// See [`UpdateChartAction`].
    UpdateChart(UpdateChartAction),
    /// See [`RemoveDimensionAction`].
    RemoveDimension(RemoveDimensionAction),
    /// See [`RemoveChartAction`].
    RemoveChart(RemoveChartAction),
}

impl EngineAction {
    /// Returns the action's kind.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateChart(_) => ActionKind::CreateChart,
            Self::CreateDimension(_) => ActionKind::CreateDimension,
            Self::UpdateChart(_) => ActionKind::UpdateChart,
            Self::RemoveDimension(_) => ActionKind::RemoveDimension,
            Self::RemoveChart(_) => ActionKind::RemoveChart,
        }
    }

    /// Returns the chart instance ID the action targets.
    pub fn chart_id(&self) -> &str {
        match self {
            Self::CreateChart(a) => &a.chart_id,
            Self::CreateDimension(a) => &a.chart_id,
            Self::UpdateChart(a) => &a.chart_id,
            Self::RemoveDimension(a) => &a.chart_id,
            Self::RemoveChart(a) => &a.chart_id,
        }
    }
}

/// A dimension whose name was resolved from a label at plan time.
///
/// Reported so the caller can surface dynamically discovered dimensions,
/// e.g. for debugging dashboards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InferredDimension {
    /// The owning chart instance ID.
    pub chart_id: String,
    /// The resolved dimension name.
    pub name: String,
    /// The label key the name was read from.
    pub label_key: String,
}

/// The ordered output of one planning cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// The build sequence number this plan was computed for.
    pub seq: u64,
    /// Actions in application order.
    pub actions: Vec<EngineAction>,
    /// Template dimensions whose names were inferred from labels this
    /// cycle, sorted.
    pub inferred_dimensions: Vec<InferredDimension>,
}

impl Plan {
    /// An empty plan for the given sequence number.
    pub fn empty(seq: u64) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }

    /// True if the plan carries no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The kinds of all actions in order, mostly useful in assertions.
    pub fn action_kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(EngineAction::kind).collect()
    }
}
