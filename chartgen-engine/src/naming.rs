//! Per-series dimension name resolution.

use chartgen_template::{DimensionNaming, DimensionRule};

use crate::error::PlanError;
use crate::reader::{FlatSeries, FlattenRole};

/// Derives the label key a dimension name is read from, based on the
/// series' structural role.
///
/// Returns `Ok(None)` for roles that carry no per-series naming label
/// (histogram and summary counts and sums); the caller falls back to a
/// static name. A plain scalar has no structural naming at all, which is
/// a template error surfaced at plan time.
pub fn infer_dimension_label_key(
    metric_name: &str,
    role: FlattenRole,
) -> Result<Option<String>, PlanError> {
    match role {
        FlattenRole::HistogramBucket => Ok(Some("le".to_owned())),
        FlattenRole::SummaryQuantile => Ok(Some("quantile".to_owned())),
        // State sets expose one label named after the metric family itself.
        FlattenRole::StateSetState => Ok(Some(metric_name.to_owned())),
        FlattenRole::HistogramCount
        | FlattenRole::HistogramSum
        | FlattenRole::SummaryCount
        | FlattenRole::SummarySum => Ok(None),
        FlattenRole::None => Err(PlanError::UnsupportedFlattenRole {
            series: metric_name.to_owned(),
            role,
        }),
    }
}

/// A dimension name resolved for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedName {
    pub name: String,
    /// The label key the name was read from, for dynamic names.
    pub label_key: Option<String>,
    /// True when the key came from structural inference.
    pub inferred: bool,
}

/// Resolves the dimension name one rule produces for one series.
///
/// `Ok(None)` means the series produces no dimension under this rule
/// (the naming label is absent), which silently drops the route.
pub(crate) fn resolve_dimension_name(
    rule: &DimensionRule,
    series: &FlatSeries,
) -> Result<Option<ResolvedName>, PlanError> {
    match &rule.naming {
        DimensionNaming::Static(name) => Ok(Some(ResolvedName {
            name: name.clone(),
            label_key: None,
            inferred: false,
        })),
        DimensionNaming::FromLabel(key) => Ok(series.labels.get(key).map(|value| ResolvedName {
            name: value.clone(),
            label_key: Some(key.clone()),
            inferred: false,
        })),
        DimensionNaming::Infer => resolve_inferred(series),
    }
}

fn resolve_inferred(series: &FlatSeries) -> Result<Option<ResolvedName>, PlanError> {
    let base = series.meta.base_name_or(&series.name);
    let static_name = match series.meta.flatten_role {
        FlattenRole::HistogramCount | FlattenRole::SummaryCount => Some("events/s"),
        FlattenRole::HistogramSum | FlattenRole::SummarySum => Some("sum"),
        _ => None,
    };
    if let Some(name) = static_name {
        return Ok(Some(ResolvedName {
            name: name.to_owned(),
            label_key: None,
            inferred: false,
        }));
    }

    let Some(key) = infer_dimension_label_key(base, series.meta.flatten_role)? else {
        return Ok(None);
    };
    Ok(series.labels.get(&key).map(|value| ResolvedName {
        name: value.clone(),
        label_key: Some(key.clone()),
        inferred: true,
    }))
}

#[cfg(test)]
mod tests {
    use chartgen_template::Labels;

    use super::*;
    use crate::reader::SeriesMeta;

    fn series(name: &str, role: FlattenRole, labels: &[(&str, &str)]) -> FlatSeries {
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
                base_name: None,
            },
            first_seen_seq: 1,
        }
    }

    #[test]
    fn test_infer_key_per_role() {
        assert_eq!(
            infer_dimension_label_key("m", FlattenRole::HistogramBucket).unwrap(),
            Some("le".to_owned())
        );
        assert_eq!(
            infer_dimension_label_key("m", FlattenRole::SummaryQuantile).unwrap(),
            Some("quantile".to_owned())
        );
        assert_eq!(
            infer_dimension_label_key("system_status", FlattenRole::StateSetState).unwrap(),
            Some("system_status".to_owned())
        );
        assert_eq!(
            infer_dimension_label_key("m", FlattenRole::HistogramCount).unwrap(),
            None
        );
        assert!(infer_dimension_label_key("m", FlattenRole::None).is_err());
    }

    #[test]
    fn test_inferred_name_reads_the_role_label() {
        let s = series("lat_bucket", FlattenRole::HistogramBucket, &[("le", "0.5")]);
        let resolved = resolve_inferred(&s).unwrap().unwrap();
        assert_eq!(resolved.name, "0.5");
        assert_eq!(resolved.label_key.as_deref(), Some("le"));
        assert!(resolved.inferred);
    }

    #[test]
    fn test_missing_naming_label_drops_the_route() {
        let s = series("lat_bucket", FlattenRole::HistogramBucket, &[]);
        assert_eq!(resolve_inferred(&s).unwrap(), None);
    }

    #[test]
    fn test_count_and_sum_fall_back_to_static_names() {
        let count = series("lat_count", FlattenRole::HistogramCount, &[]);
        assert_eq!(resolve_inferred(&count).unwrap().unwrap().name, "events/s");

        let sum = series("lat_sum", FlattenRole::SummarySum, &[]);
        let resolved = resolve_inferred(&sum).unwrap().unwrap();
        assert_eq!(resolved.name, "sum");
        assert!(!resolved.inferred);
    }
}
