//! Fallback chart synthesis for series no template matched.
//!
//! When enabled, every unmatched series still becomes visible: the engine
//! synthesizes a chart instance whose identity is the metric name plus all
//! label pairs, and derives presentation metadata from the metric name and
//! any collector-recorded metadata. Multi-component families (histograms,
//! summaries, state sets) fold their keyed components into one chart per
//! label set; counts and sums chart separately under their suffixed names.

use std::collections::BTreeSet;

use chartgen_template::{
    Algorithm, ChartMeta, ChartType, Labels, Lifecycle, sanitize_id_value,
};

use crate::reader::{FlatSeries, FlattenRole, MetricMeta, SeriesReader};
use crate::route::RouteBinding;

/// Default upper bound on `type.id` length on the wire.
pub const DEFAULT_MAX_TYPE_ID_LEN: usize = 1200;

/// Smallest accepted `type.id` length bound.
pub const MIN_TYPE_ID_LEN: usize = 4;

/// Dashboard priority for fallback charts; sorts after template charts.
const AUTOGEN_PRIORITY: u32 = 90_000;

/// Configuration of the fallback chart path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutogenPolicy {
    /// Synthesize charts for unmatched series.
    pub enabled: bool,
    /// The wire `type` component prepended to chart IDs on emission.
    /// Counted against the length budget but not part of the chart ID.
    pub type_id: String,
    /// Hard budget for `type.id`; a fallback chart whose full ID would
    /// exceed it is dropped, never truncated.
    pub max_type_id_len: usize,
    /// Cycles without observation before a fallback chart is removed.
    /// Zero disables expiry.
    pub expire_after_success_cycles: u64,
}

impl Default for AutogenPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            type_id: String::new(),
            max_type_id_len: DEFAULT_MAX_TYPE_ID_LEN,
            expire_after_success_cycles: 0,
        }
    }
}

/// Synthesizes the fallback route for one unmatched series.
///
/// Returns `None` when the series cannot chart: its naming label is
/// missing or the rendered ID blows the `type.id` budget.
pub(crate) fn build_route(
    series: &FlatSeries,
    reader: &dyn SeriesReader,
    policy: &AutogenPolicy,
) -> Option<RouteBinding> {
    let role = series.meta.flatten_role;
    let base = series.meta.base_name_or(&series.name);

    // Keyed components fold into one chart per label set under the family
    // base name; everything else charts under its own (suffixed) name.
    let (id_root, structural_key) = match role {
        FlattenRole::HistogramBucket => (base, Some("le".to_owned())),
        FlattenRole::SummaryQuantile => (base, Some("quantile".to_owned())),
        FlattenRole::StateSetState => (base, Some(base.to_owned())),
        _ => (series.name.as_str(), None),
    };

    let dim_name = match role {
        FlattenRole::HistogramBucket => format!("bucket_{}", series.labels.get("le")?),
        FlattenRole::SummaryQuantile => format!("quantile_{}", series.labels.get("quantile")?),
        FlattenRole::StateSetState => series.labels.get(base)?.clone(),
        _ => series.name.clone(),
    };

    let mut chart_id = id_root.to_owned();
    let mut instance_labels = Labels::new();
    for (key, value) in &series.labels {
        if Some(key.as_str()) == structural_key.as_deref()
            || key.starts_with('_')
            || value.is_empty()
        {
            continue;
        }
        chart_id.push('-');
        chart_id.push_str(key);
        chart_id.push('=');
        chart_id.push_str(&sanitize_id_value(value));
        instance_labels.insert(key.clone(), value.clone());
    }

    let full_len = if policy.type_id.is_empty() {
        chart_id.len()
    } else {
        policy.type_id.len() + 1 + chart_id.len()
    };
    if full_len > policy.max_type_id_len {
        chartgen_log::warn!(
            chart_id = chart_id.as_str(),
            budget = policy.max_type_id_len,
            "fallback chart ID exceeds the type.id budget, dropping series"
        );
        return None;
    }

    let metric_meta = reader.metric_meta(base);
    let meta = chart_meta(role, id_root, metric_meta.as_ref());
    let algorithm = meta.algorithm;
    let dynamic = structural_key.is_some();

    Some(RouteBinding {
        template_id: format!("autogen:{id_root}"),
        chart_id,
        dim_index: 0,
        dim_name,
        label_key: structural_key.clone(),
        inferred: false,
        hidden: false,
        algorithm,
        multiplier: 1,
        divisor: 1,
        dynamic,
        autogen: true,
        meta,
        lifecycle: Lifecycle {
            expire_after_cycles: policy.expire_after_success_cycles,
            max_instances: None,
            dim_expire_after_cycles: 0,
            max_dims: None,
        },
        instance_labels,
        promote_excluded: structural_key.into_iter().collect::<BTreeSet<_>>(),
    })
}

fn chart_meta(role: FlattenRole, id_root: &str, metric_meta: Option<&MetricMeta>) -> ChartMeta {
    let (units, algorithm) = match role {
        FlattenRole::StateSetState => ("state".to_owned(), Algorithm::Absolute),
        FlattenRole::HistogramBucket => ("observations/s".to_owned(), Algorithm::Incremental),
        FlattenRole::HistogramCount | FlattenRole::SummaryCount => {
            ("events/s".to_owned(), Algorithm::Incremental)
        }
        FlattenRole::HistogramSum | FlattenRole::SummarySum => {
            (trailing_unit(id_root).unwrap_or("sum").to_owned(), Algorithm::Incremental)
        }
        FlattenRole::SummaryQuantile => {
            (trailing_unit(id_root).unwrap_or("value").to_owned(), Algorithm::Absolute)
        }
        FlattenRole::None => scalar_units(id_root, metric_meta),
    };

    let chart_type = match role {
        FlattenRole::HistogramBucket => ChartType::Heatmap,
        _ if units == "bytes/s" || units == "bits/s" => ChartType::Area,
        _ => ChartType::Line,
    };

    let title = metric_meta
        .filter(|m| !m.description.is_empty())
        .map(|m| m.description.clone())
        .unwrap_or_else(|| id_root.to_owned());
    let family = metric_meta
        .filter(|m| !m.family.is_empty())
        .map(|m| m.family.clone())
        .unwrap_or_else(|| "autogen".to_owned());

    ChartMeta {
        title,
        units,
        family,
        context: format!("autogen.{id_root}"),
        algorithm,
        chart_type,
        priority: AUTOGEN_PRIORITY,
    }
}

/// Units for a plain scalar: collector metadata first, then the trailing
/// name token, then a rate fallback for counters.
fn scalar_units(name: &str, metric_meta: Option<&MetricMeta>) -> (String, Algorithm) {
    let counter = is_counter_name(name);
    let algorithm = if counter {
        Algorithm::Incremental
    } else {
        Algorithm::Absolute
    };

    if let Some(unit) = metric_meta.map(|m| m.unit.as_str()).filter(|u| !u.is_empty()) {
        let unit = normalize_unit(unit);
        let units = if counter && !is_rate_unit(unit) {
            format!("{unit}/s")
        } else {
            unit.to_owned()
        };
        return (units, algorithm);
    }

    if strip_counter_suffixes(name).ends_with("_ratio") {
        return ("ratio".to_owned(), algorithm);
    }

    let units = match trailing_unit(name).map(normalize_unit) {
        Some(token) if !counter => token.to_owned(),
        Some(token) if is_time_unit(token) || is_rate_unit(token) => token.to_owned(),
        _ if counter => "events/s".to_owned(),
        _ => "value".to_owned(),
    };
    (units, algorithm)
}

/// Spelled-out `hertz` renders as `Hz` on the dashboard.
fn normalize_unit(unit: &str) -> &str {
    if unit == "hertz" { "Hz" } else { unit }
}

/// Units that are already per-second; counters keep them without `/s`.
fn is_rate_unit(unit: &str) -> bool {
    unit.contains('/') || unit == "Hz"
}

fn is_counter_name(name: &str) -> bool {
    strip_counter_suffixes(name).len() != name.len()
}

fn strip_counter_suffixes(name: &str) -> &str {
    let mut base = name;
    loop {
        let stripped = base
            .strip_suffix("_total")
            .or_else(|| base.strip_suffix("_count"))
            .or_else(|| base.strip_suffix("_sum"))
            .or_else(|| base.strip_suffix("_bucket"));
        match stripped {
            Some(rest) if !rest.is_empty() => base = rest,
            _ => return base,
        }
    }
}

/// The last name segment, used as a unit guess for gauges and sums.
/// A single-segment name carries no unit hint.
fn trailing_unit(name: &str) -> Option<&str> {
    let base = strip_counter_suffixes(name);
    if !base.contains(['_', '.']) {
        return None;
    }
    base.rsplit(['_', '.']).next().filter(|token| !token.is_empty())
}

fn is_time_unit(token: &str) -> bool {
    matches!(
        token,
        "seconds" | "milliseconds" | "microseconds" | "nanoseconds" | "minutes" | "hours"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SeriesMeta;

    struct EmptyReader;

    impl SeriesReader for EmptyReader {
        fn build_seq(&self) -> u64 {
            1
        }

        fn flatten(&self) -> Vec<FlatSeries> {
            Vec::new()
        }

        fn metric_meta(&self, _name: &str) -> Option<MetricMeta> {
            None
        }
    }

    fn series(name: &str, role: FlattenRole, base: Option<&str>, labels: &[(&str, &str)]) -> FlatSeries {
        FlatSeries {
            series_id: 1,
            name: name.to_owned(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Labels>(),
            value: 1.0,
            meta: SeriesMeta {
                flatten_role: role,
                base_name: base.map(str::to_owned),
            },
            first_seen_seq: 1,
        }
    }

    fn policy() -> AutogenPolicy {
        AutogenPolicy {
            enabled: true,
            ..AutogenPolicy::default()
        }
    }

    #[test]
    fn test_scalar_counter_chart() {
        let s = series("svc.errors_total", FlattenRole::None, None, &[("method", "GET")]);
        let binding = build_route(&s, &EmptyReader, &policy()).unwrap();

        assert_eq!(binding.chart_id, "svc.errors_total-method=GET");
        assert_eq!(binding.dim_name, "svc.errors_total");
        assert_eq!(binding.meta.context, "autogen.svc.errors_total");
        assert_eq!(binding.meta.units, "events/s");
        assert_eq!(binding.algorithm, Algorithm::Incremental);
        assert_eq!(binding.instance_labels["method"], "GET");
    }

    #[test]
    fn test_gauge_units_from_trailing_token() {
        let s = series("svc.queue_depth", FlattenRole::None, None, &[("queue", "main")]);
        let binding = build_route(&s, &EmptyReader, &policy()).unwrap();

        assert_eq!(binding.chart_id, "svc.queue_depth-queue=main");
        assert_eq!(binding.meta.units, "depth");
        assert_eq!(binding.algorithm, Algorithm::Absolute);
    }

    #[test]
    fn test_hertz_normalizes_to_hz() {
        let s = series("cpu.frequency_hertz", FlattenRole::None, None, &[("core", "0")]);
        let binding = build_route(&s, &EmptyReader, &policy()).unwrap();

        assert_eq!(binding.meta.units, "Hz");
        assert_eq!(binding.algorithm, Algorithm::Absolute);

        struct HertzReader;
        impl SeriesReader for HertzReader {
            fn build_seq(&self) -> u64 {
                1
            }
            fn flatten(&self) -> Vec<FlatSeries> {
                Vec::new()
            }
            fn metric_meta(&self, _name: &str) -> Option<MetricMeta> {
                Some(MetricMeta {
                    unit: "hertz".to_owned(),
                    ..MetricMeta::default()
                })
            }
        }

        // Hertz is already a rate, so a counter keeps it without `/s`.
        let s = series("cpu.cycles_total", FlattenRole::None, None, &[]);
        let binding = build_route(&s, &HertzReader, &policy()).unwrap();
        assert_eq!(binding.meta.units, "Hz");
        assert_eq!(binding.algorithm, Algorithm::Incremental);
    }

    #[test]
    fn test_histogram_bucket_folds_into_base_chart() {
        let s = series(
            "svc.latency_seconds_bucket",
            FlattenRole::HistogramBucket,
            Some("svc.latency_seconds"),
            &[("method", "GET"), ("le", "1")],
        );
        let binding = build_route(&s, &EmptyReader, &policy()).unwrap();

        assert_eq!(binding.chart_id, "svc.latency_seconds-method=GET");
        assert_eq!(binding.dim_name, "bucket_1");
        assert_eq!(binding.meta.chart_type, ChartType::Heatmap);
        assert!(!binding.instance_labels.contains_key("le"));
        assert!(binding.promote_excluded.contains("le"));
    }

    #[test]
    fn test_stateset_dims_are_state_names() {
        let s = series(
            "svc.service_mode",
            FlattenRole::StateSetState,
            None,
            &[("svc.service_mode", "operational")],
        );
        let binding = build_route(&s, &EmptyReader, &policy()).unwrap();

        assert_eq!(binding.chart_id, "svc.service_mode");
        assert_eq!(binding.dim_name, "operational");
        assert_eq!(binding.meta.units, "state");
        assert_eq!(binding.meta.context, "autogen.svc.service_mode");
        assert!(!binding.instance_labels.contains_key("svc.service_mode"));
    }

    #[test]
    fn test_type_id_budget_drops_oversized_charts() {
        let mut policy = policy();
        policy.type_id = "collector.job".to_owned();
        policy.max_type_id_len = 32;

        let s = series(
            "svc.this_metric_name_is_long_total",
            FlattenRole::None,
            None,
            &[("tenant", "a_very_long_tenant_name")],
        );
        assert!(build_route(&s, &EmptyReader, &policy).is_none());

        policy.max_type_id_len = DEFAULT_MAX_TYPE_ID_LEN;
        assert!(build_route(&s, &EmptyReader, &policy).is_some());
    }

    #[test]
    fn test_reserved_labels_never_reach_the_chart_id() {
        let s = series(
            "svc.up",
            FlattenRole::None,
            None,
            &[("_collect_job", "job1"), ("node", "a")],
        );
        let binding = build_route(&s, &EmptyReader, &policy()).unwrap();
        assert_eq!(binding.chart_id, "svc.up-node=a");
    }
}
