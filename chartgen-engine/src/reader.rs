//! The read-only boundary between sample collection and chart planning.
//!
//! The engine never touches the collector's internal sample store. Instead
//! it consumes a flattened, point-in-time view through [`SeriesReader`]:
//! one [`FlatSeries`] per concrete series, each tagged with the structural
//! role it played in its source metric family.

use chartgen_template::Labels;

/// The structural role a flattened series played in its source family.
///
/// Scalar counters and gauges carry [`FlattenRole::None`]; complex families
/// (histograms, summaries, state sets) decompose into one series per
/// component and the role records which component this is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FlattenRole {
    /// A plain scalar series.
    #[default]
    None,
    /// One cumulative histogram bucket, keyed by the `le` label.
    HistogramBucket,
    /// The observation count of a histogram.
    HistogramCount,
    /// The value sum of a histogram.
    HistogramSum,
    /// One summary quantile, keyed by the `quantile` label.
    SummaryQuantile,
    /// The observation count of a summary.
    SummaryCount,
    /// The value sum of a summary.
    SummarySum,
    /// One state of a state set, keyed by a label named after the metric.
    StateSetState,
}

impl FlattenRole {
    /// Returns the role name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::HistogramBucket => "histogram_bucket",
            Self::HistogramCount => "histogram_count",
            Self::HistogramSum => "histogram_sum",
            Self::SummaryQuantile => "summary_quantile",
            Self::SummaryCount => "summary_count",
            Self::SummarySum => "summary_sum",
            Self::StateSetState => "stateset_state",
        }
    }
}

/// Structural metadata attached to a flattened series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesMeta {
    /// The series' structural role.
    pub flatten_role: FlattenRole,
    /// The metric family name before component suffixes were attached,
    /// when it differs from the series name.
    pub base_name: Option<String>,
}

impl SeriesMeta {
    /// Returns the family base name, falling back to the given series name.
    pub fn base_name_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.base_name.as_deref().unwrap_or(name)
    }
}

/// One flattened series observed in the current collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSeries {
    /// Stable numeric identity of this series within the reader.
    ///
    /// The same (name, labels) pair keeps the same ID across cycles; the
    /// route cache is keyed by it.
    pub series_id: u64,
    /// The full metric name, including any component suffix.
    pub name: String,
    /// The series' label set.
    pub labels: Labels,
    /// The sample value of this cycle.
    pub value: f64,
    /// Structural metadata.
    pub meta: SeriesMeta,
    /// The build sequence number of the cycle this series first appeared in.
    pub first_seen_seq: u64,
}

/// Collector-provided metric family metadata.
///
/// When present, it overrides the fallback-chart heuristics for title,
/// family and units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricMeta {
    /// Human readable description.
    pub description: String,
    /// Dashboard family.
    pub family: String,
    /// Unit string.
    pub unit: String,
}

/// A read-only, point-in-time view of one collection cycle.
pub trait SeriesReader {
    /// The monotonically increasing sequence number of the last
    /// successfully committed collection cycle.
    fn build_seq(&self) -> u64;

    /// All series observed in the current cycle, flattened to scalars.
    fn flatten(&self) -> Vec<FlatSeries>;

    /// Metadata for a metric family, when the collector recorded any.
    fn metric_meta(&self, name: &str) -> Option<MetricMeta>;
}
