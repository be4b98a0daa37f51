use thiserror::Error;

/// An error raised while parsing or compiling a series selector.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// The selector string is empty.
    #[error("empty selector")]
    Empty,
    /// A label block was opened but never closed, or vice versa.
    #[error("unbalanced label block")]
    UnbalancedBraces,
    /// A label matcher does not follow the `key op "value"` shape.
    #[error("invalid label matcher {matcher:?}")]
    InvalidMatcher {
        /// The offending matcher fragment.
        matcher: String,
    },
    /// The metric name contains characters outside the supported set.
    #[error("invalid metric name {name:?}")]
    InvalidName {
        /// The offending name fragment.
        name: String,
    },
    /// A `=~` or `!~` value failed to compile as a regular expression.
    #[error("invalid regular expression")]
    Regex(#[from] regex::Error),
}

/// An error raised by [`compile`](crate::compile).
///
/// Compile errors are always reported to the caller of `load`; a failed
/// compilation must leave any previously loaded program untouched.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A chart has neither an `id` nor a `context` to derive one from.
    #[error("chart without id or context")]
    MissingId,
    /// Two charts in the same template resolve to the same chart ID.
    #[error("duplicate chart id {chart_id:?}")]
    DuplicateChartId {
        /// The colliding chart ID.
        chart_id: String,
    },
    /// A chart declares no dimensions.
    #[error("chart {chart_id:?} has no dimensions")]
    EmptyChart {
        /// The offending chart ID.
        chart_id: String,
    },
    /// A dimension selector failed to parse.
    #[error("chart {chart_id:?}: invalid selector {selector:?}")]
    Selector {
        /// The owning chart ID.
        chart_id: String,
        /// The selector source text.
        selector: String,
        /// The underlying parse error.
        #[source]
        source: SelectorError,
    },
    /// A selector names a metric that is not visible in its group scope.
    #[error("chart {chart_id:?}: metric {metric:?} is not visible in current group scope")]
    MetricNotVisible {
        /// The owning chart ID.
        chart_id: String,
        /// The metric name the selector constrained.
        metric: String,
    },
    /// A chart mixes inferred counter-like and gauge-like dimensions
    /// without an explicit algorithm.
    #[error("chart {chart_id:?}: ambiguous algorithm, chart mixes counter-like and gauge-like dimensions")]
    AmbiguousAlgorithm {
        /// The offending chart ID.
        chart_id: String,
    },
    /// A chart ID or static dimension name contains template placeholders.
    ///
    /// Phase-1 syntax forbids placeholders; per-series instantiation must go
    /// through `instances.by_labels`.
    #[error("chart {chart_id:?}: placeholders are not allowed in ids or static names, use instances.by_labels")]
    PlaceholderNotAllowed {
        /// The offending chart ID.
        chart_id: String,
    },
    /// A dimension declares both `name` and `name_from_label`.
    #[error("chart {chart_id:?}: dimension declares both name and name_from_label")]
    NamingConflict {
        /// The owning chart ID.
        chart_id: String,
    },
    /// A lifecycle block carries a value that cannot be enforced.
    #[error("chart {chart_id:?}: invalid lifecycle: {reason}")]
    InvalidLifecycle {
        /// The owning chart ID.
        chart_id: String,
        /// Human readable rejection reason.
        reason: String,
    },
}
