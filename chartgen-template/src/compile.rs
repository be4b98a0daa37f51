//! The template compiler.
//!
//! A pure function from a validated [`TemplateSpec`] plus a revision number
//! to an immutable [`Program`]. Compilation is deterministic and
//! side-effect-free: identical input always yields an identical program
//! aside from the revision number.

use std::collections::BTreeSet;

use crate::error::CompileError;
use crate::pattern::{self, Pattern};
use crate::program::{
    Algorithm, Chart, ChartIdentity, ChartMeta, DEFAULT_CHART_EXPIRE_CYCLES, DEFAULT_PRIORITY,
    DimensionNaming, DimensionRule, InstanceToken, LabelPolicy, Lifecycle, Program, PromotionMode,
};
use crate::selector::Selector;
use crate::spec::{ChartSpec, DimensionSpec, GroupSpec, TemplateSpec};

/// Metric-name suffixes that mark a series as counter-like.
const COUNTER_SUFFIXES: [&str; 4] = ["_total", "_count", "_sum", "_bucket"];

/// Compiles a template spec into a [`Program`].
///
/// Group-scoped metric visibility and family inheritance propagate down the
/// group tree; every chart gets a stable template ID encoding its position
/// (`g0.g1.c2`). Errors leave no partial state behind, the caller keeps
/// whatever program it had before.
pub fn compile(spec: &TemplateSpec, revision: u64) -> Result<Program, CompileError> {
    let mut compiler = Compiler::default();

    for (index, group) in spec.groups.iter().enumerate() {
        let scope = Scope {
            path: format!("g{index}"),
            family: group.family.clone(),
            visible: group.metrics.clone(),
        };
        compiler.group(group, scope)?;
    }

    let metric_names = compiler.metric_names.into_iter().collect();
    Ok(Program::new(
        spec.version.clone(),
        revision,
        metric_names,
        compiler.charts,
    ))
}

/// Inherited group context while walking the template tree.
struct Scope {
    path: String,
    family: String,
    visible: Vec<String>,
}

#[derive(Default)]
struct Compiler {
    charts: Vec<Chart>,
    metric_names: BTreeSet<String>,
    seen_ids: BTreeSet<String>,
}

impl Compiler {
    fn group(&mut self, group: &GroupSpec, scope: Scope) -> Result<(), CompileError> {
        self.metric_names.extend(group.metrics.iter().cloned());

        for (index, chart) in group.charts.iter().enumerate() {
            let template_id = format!("{}.c{}", scope.path, index);
            let chart = self.chart(chart, template_id, &scope)?;
            self.charts.push(chart);
        }

        for (index, nested) in group.groups.iter().enumerate() {
            let mut visible = scope.visible.clone();
            visible.extend(nested.metrics.iter().cloned());
            let family = if nested.family.is_empty() {
                scope.family.clone()
            } else {
                nested.family.clone()
            };
            let nested_scope = Scope {
                path: format!("{}.g{}", scope.path, index),
                family,
                visible,
            };
            self.group(nested, nested_scope)?;
        }

        Ok(())
    }

    fn chart(
        &mut self,
        spec: &ChartSpec,
        template_id: String,
        scope: &Scope,
    ) -> Result<Chart, CompileError> {
        let chart_id = if !spec.id.is_empty() {
            spec.id.clone()
        } else if !spec.context.is_empty() {
            spec.context.clone()
        } else {
            return Err(CompileError::MissingId);
        };

        if has_placeholder(&chart_id) {
            return Err(CompileError::PlaceholderNotAllowed { chart_id });
        }
        if !self.seen_ids.insert(chart_id.clone()) {
            return Err(CompileError::DuplicateChartId { chart_id });
        }
        if spec.dimensions.is_empty() {
            return Err(CompileError::EmptyChart { chart_id });
        }

        let lifecycle = compile_lifecycle(spec, &chart_id)?;
        let identity = compile_identity(spec, &chart_id);

        let mut dimensions = Vec::with_capacity(spec.dimensions.len());
        let mut excluded = BTreeSet::new();
        let mut counter_like = false;
        let mut gauge_like = false;

        for dim in &spec.dimensions {
            let (rule, selector_metric) = compile_dimension(dim, &chart_id)?;

            if let Some(metric) = selector_metric {
                if !is_visible(&scope.visible, &metric) {
                    return Err(CompileError::MetricNotVisible { chart_id, metric });
                }
                // Only exact-name dimensions without an explicit
                // algorithm override vote on inference.
                if dim.algorithm.is_none() {
                    if is_counter_like(&metric) {
                        counter_like = true;
                    } else {
                        gauge_like = true;
                    }
                }
            }

            excluded.extend(rule.selector.constrained_keys().map(str::to_owned));
            if let DimensionNaming::FromLabel(key) = &rule.naming {
                excluded.insert(key.clone());
            }

            dimensions.push(rule);
        }

        let algorithm = match spec.algorithm {
            Some(algorithm) => algorithm,
            None if counter_like && gauge_like => {
                return Err(CompileError::AmbiguousAlgorithm { chart_id });
            }
            None if counter_like => Algorithm::Incremental,
            None => Algorithm::Absolute,
        };

        // Dimensions without an explicit override follow the chart.
        for (rule, dim) in dimensions.iter_mut().zip(&spec.dimensions) {
            if dim.algorithm.is_none() {
                rule.algorithm = algorithm;
            }
        }

        let mode = if spec.labels.promote.is_empty() {
            PromotionMode::Auto
        } else {
            PromotionMode::Explicit(spec.labels.promote.clone())
        };

        let family = if spec.family.is_empty() {
            scope.family.clone()
        } else {
            spec.family.clone()
        };

        Ok(Chart {
            template_id,
            meta: ChartMeta {
                title: spec.title.clone(),
                units: spec.units.clone(),
                family,
                context: spec.context.clone(),
                algorithm,
                chart_type: spec.chart_type.unwrap_or_default(),
                priority: spec.priority.unwrap_or(DEFAULT_PRIORITY),
            },
            identity,
            labels: LabelPolicy { mode, excluded },
            lifecycle,
            dimensions,
        })
    }
}

fn compile_dimension(
    dim: &DimensionSpec,
    chart_id: &str,
) -> Result<(DimensionRule, Option<String>), CompileError> {
    let naming = match (&dim.name, &dim.name_from_label) {
        (Some(_), Some(_)) => {
            return Err(CompileError::NamingConflict {
                chart_id: chart_id.to_owned(),
            });
        }
        (Some(name), None) => {
            if has_placeholder(name) {
                return Err(CompileError::PlaceholderNotAllowed {
                    chart_id: chart_id.to_owned(),
                });
            }
            DimensionNaming::Static(name.clone())
        }
        (None, Some(key)) => DimensionNaming::FromLabel(key.clone()),
        (None, None) => DimensionNaming::Infer,
    };

    let selector =
        Selector::parse(&dim.selector).map_err(|source| CompileError::Selector {
            chart_id: chart_id.to_owned(),
            selector: dim.selector.clone(),
            source,
        })?;
    let metric = selector.metric_name().map(str::to_owned);

    let dynamic = !matches!(naming, DimensionNaming::Static(_));
    let rule = DimensionRule {
        selector,
        naming,
        hidden: dim.hidden,
        // Re-assigned from the chart after inference when not overridden.
        algorithm: dim.algorithm.unwrap_or_default(),
        multiplier: dim.multiplier.unwrap_or(1),
        divisor: dim.divisor.unwrap_or(1),
        dynamic,
    };
    Ok((rule, metric))
}

fn compile_lifecycle(spec: &ChartSpec, chart_id: &str) -> Result<Lifecycle, CompileError> {
    let lifecycle = &spec.lifecycle;

    if lifecycle.expire_after_cycles == Some(0) {
        return Err(CompileError::InvalidLifecycle {
            chart_id: chart_id.to_owned(),
            reason: "expire_after_cycles must be positive".to_owned(),
        });
    }
    if lifecycle.max_instances == Some(0) {
        return Err(CompileError::InvalidLifecycle {
            chart_id: chart_id.to_owned(),
            reason: "max_instances must be positive".to_owned(),
        });
    }
    if lifecycle.dimensions.max_dims == Some(0) {
        return Err(CompileError::InvalidLifecycle {
            chart_id: chart_id.to_owned(),
            reason: "max_dims must be positive".to_owned(),
        });
    }

    Ok(Lifecycle {
        expire_after_cycles: lifecycle
            .expire_after_cycles
            .unwrap_or(DEFAULT_CHART_EXPIRE_CYCLES),
        max_instances: lifecycle.max_instances,
        dim_expire_after_cycles: lifecycle.dimensions.expire_after_cycles.unwrap_or(0),
        max_dims: lifecycle.dimensions.max_dims,
    })
}

fn compile_identity(spec: &ChartSpec, chart_id: &str) -> ChartIdentity {
    let tokens = spec
        .instances
        .by_labels
        .iter()
        .map(|token| match token.as_str() {
            "*" => InstanceToken::IncludeAll,
            excluded if excluded.starts_with('!') => {
                InstanceToken::Exclude(excluded[1..].to_owned())
            }
            key => InstanceToken::Key(key.to_owned()),
        })
        .collect();

    ChartIdentity {
        id_template: chart_id.to_owned(),
        tokens,
    }
}

fn has_placeholder(text: &str) -> bool {
    text.contains(['{', '}'])
}

fn is_counter_like(metric: &str) -> bool {
    COUNTER_SUFFIXES
        .iter()
        .any(|suffix| metric.ends_with(suffix))
}

fn is_visible(visible: &[String], metric: &str) -> bool {
    visible.iter().any(|entry| {
        entry == metric || (pattern::contains_meta(entry) && Pattern::new(entry).is_match(metric))
    })
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::spec::{InstancesSpec, LifecycleSpec};

    fn spec(json: serde_json::Value) -> TemplateSpec {
        serde_json::from_value(json).unwrap()
    }

    fn basic_spec() -> TemplateSpec {
        spec(serde_json::json!({
            "version": "v1",
            "groups": [{
                "family": "Service",
                "metrics": ["svc.requests_total"],
                "charts": [{
                    "title": "Requests",
                    "context": "requests",
                    "units": "requests/s",
                    "dimensions": [
                        {"selector": "svc.requests_total", "name": "total"}
                    ]
                }]
            }]
        }))
    }

    #[test]
    fn test_compile_basic() {
        let program = compile(&basic_spec(), 7).unwrap();
        assert_eq!(program.revision, 7);
        assert_eq!(program.version, "v1");
        assert_eq!(program.metric_names(), ["svc.requests_total"]);

        let chart = &program.charts()[0];
        assert_eq!(chart.template_id, "g0.c0");
        assert_eq!(chart.meta.family, "Service");
        assert_eq!(chart.meta.context, "requests");
        assert_eq!(chart.meta.algorithm, Algorithm::Incremental);
        assert_eq!(chart.meta.priority, DEFAULT_PRIORITY);
        assert!(chart.identity.is_static());
        assert_eq!(chart.identity.id_template, "requests");
        assert_eq!(chart.lifecycle.expire_after_cycles, DEFAULT_CHART_EXPIRE_CYCLES);
        assert_eq!(chart.lifecycle.dim_expire_after_cycles, 0);

        let dim = &chart.dimensions[0];
        assert_eq!(dim.naming, DimensionNaming::Static("total".to_owned()));
        assert_eq!(dim.algorithm, Algorithm::Incremental);
        assert!(!dim.dynamic);
        assert_eq!((dim.multiplier, dim.divisor), (1, 1));
    }

    #[test]
    fn test_nested_group_paths_and_family_inheritance() {
        let program = compile(
            &spec(serde_json::json!({
                "version": "v1",
                "groups": [{
                    "family": "Outer",
                    "metrics": ["outer_gauge"],
                    "charts": [{
                        "context": "outer",
                        "dimensions": [{"selector": "outer_gauge", "name": "v"}]
                    }],
                    "groups": [{
                        "metrics": ["inner_gauge"],
                        "charts": [
                            {
                                "context": "inner_a",
                                "dimensions": [{"selector": "inner_gauge", "name": "v"}]
                            },
                            {
                                "context": "inner_b",
                                // Inherited visibility from the outer group.
                                "dimensions": [{"selector": "outer_gauge", "name": "v"}]
                            }
                        ]
                    }]
                }]
            })),
            1,
        )
        .unwrap();

        let ids: Vec<_> = program
            .charts()
            .iter()
            .map(|c| c.template_id.as_str())
            .collect();
        assert_eq!(ids, ["g0.c0", "g0.g0.c0", "g0.g0.c1"]);
        assert_eq!(program.charts()[1].meta.family, "Outer");
        assert_eq!(
            program.metric_names(),
            ["inner_gauge", "outer_gauge"]
        );
    }

    #[test]
    fn test_metric_not_visible() {
        let mut spec = basic_spec();
        spec.groups[0].charts[0].dimensions[0].selector = "svc.other_total".to_owned();
        let err = compile(&spec, 1).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MetricNotVisible { metric, .. } if metric == "svc.other_total"
        ));
    }

    #[test]
    fn test_glob_visibility() {
        let mut spec = basic_spec();
        spec.groups[0].metrics = vec!["svc.*".to_owned()];
        assert!(compile(&spec, 1).is_ok());
    }

    #[test]
    fn test_ambiguous_algorithm() {
        let mut spec = basic_spec();
        spec.groups[0].metrics.push("svc.queue_depth".to_owned());
        spec.groups[0].charts[0].dimensions.push(DimensionSpec {
            selector: "svc.queue_depth".to_owned(),
            name: Some("depth".to_owned()),
            ..Default::default()
        });
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::AmbiguousAlgorithm { .. })
        ));

        // An explicit algorithm resolves the ambiguity.
        spec.groups[0].charts[0].algorithm = Some(Algorithm::Absolute);
        let program = compile(&spec, 1).unwrap();
        assert_eq!(program.charts()[0].meta.algorithm, Algorithm::Absolute);
    }

    #[test]
    fn test_dimension_override_does_not_vote_on_inference() {
        let mut spec = basic_spec();
        spec.groups[0].metrics.push("svc.queue_depth".to_owned());
        spec.groups[0].charts[0].dimensions.push(DimensionSpec {
            selector: "svc.queue_depth".to_owned(),
            name: Some("depth".to_owned()),
            algorithm: Some(Algorithm::Absolute),
            ..Default::default()
        });

        // The overridden gauge-like dimension abstains, so the remaining
        // counter-like vote is unambiguous.
        let program = compile(&spec, 1).unwrap();
        let chart = &program.charts()[0];
        assert_eq!(chart.meta.algorithm, Algorithm::Incremental);
        assert_eq!(chart.dimensions[0].algorithm, Algorithm::Incremental);
        assert_eq!(chart.dimensions[1].algorithm, Algorithm::Absolute);
    }

    #[test]
    fn test_placeholder_rejected() {
        let mut spec = basic_spec();
        spec.groups[0].charts[0].id = "requests_{{label}}".to_owned();
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::PlaceholderNotAllowed { .. })
        ));

        let mut spec = basic_spec();
        spec.groups[0].charts[0].dimensions[0].name = Some("{{mode}}".to_owned());
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::PlaceholderNotAllowed { .. })
        ));
    }

    #[test]
    fn test_naming_conflict() {
        let mut spec = basic_spec();
        spec.groups[0].charts[0].dimensions[0].name_from_label = Some("mode".to_owned());
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::NamingConflict { .. })
        ));
    }

    #[test]
    fn test_infer_mode_is_dynamic() {
        let mut spec = basic_spec();
        spec.groups[0].charts[0].dimensions[0].name = None;
        let program = compile(&spec, 1).unwrap();
        let dim = &program.charts()[0].dimensions[0];
        assert_eq!(dim.naming, DimensionNaming::Infer);
        assert!(dim.dynamic);
    }

    #[test]
    fn test_label_policy_modes_and_exclusions() {
        let program = compile(
            &spec(serde_json::json!({
                "version": "v1",
                "groups": [{
                    "family": "Net",
                    "metrics": ["net_bytes"],
                    "charts": [{
                        "context": "traffic",
                        "algorithm": "incremental",
                        "labels": {"promote": ["zone"]},
                        "dimensions": [
                            {"selector": "net_bytes{direction=\"in\"}", "name": "received"},
                            {"selector": "net_bytes", "name_from_label": "mode"}
                        ]
                    }]
                }]
            })),
            1,
        )
        .unwrap();

        let policy = &program.charts()[0].labels;
        assert_eq!(policy.mode, PromotionMode::Explicit(vec!["zone".to_owned()]));
        let excluded: Vec<_> = policy.excluded.iter().map(String::as_str).collect();
        assert_eq!(excluded, ["direction", "mode"]);
    }

    #[test]
    fn test_lifecycle_validation() {
        let mut spec = basic_spec();
        spec.groups[0].charts[0].lifecycle = LifecycleSpec {
            expire_after_cycles: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::InvalidLifecycle { .. })
        ));

        let mut spec = basic_spec();
        spec.groups[0].charts[0].lifecycle.max_instances = Some(0);
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::InvalidLifecycle { .. })
        ));
    }

    #[test]
    fn test_duplicate_chart_id() {
        let mut spec = basic_spec();
        let chart = spec.groups[0].charts[0].clone();
        spec.groups[0].charts.push(chart);
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::DuplicateChartId { .. })
        ));
    }

    #[test]
    fn test_identity_tokens() {
        let mut spec = basic_spec();
        spec.groups[0].charts[0].instances = InstancesSpec {
            by_labels: vec!["nic".to_owned(), "*".to_owned(), "!le".to_owned()],
        };
        let program = compile(&spec, 1).unwrap();
        let identity = &program.charts()[0].identity;
        assert!(!identity.is_static());
        assert_eq!(
            identity.tokens,
            vec![
                InstanceToken::Key("nic".to_owned()),
                InstanceToken::IncludeAll,
                InstanceToken::Exclude("le".to_owned()),
            ]
        );
    }

    #[test]
    fn test_missing_id_and_empty_chart() {
        let mut spec = basic_spec();
        spec.groups[0].charts[0].context = String::new();
        assert!(matches!(compile(&spec, 1), Err(CompileError::MissingId)));

        let mut spec = basic_spec();
        spec.groups[0].charts[0].dimensions.clear();
        assert!(matches!(
            compile(&spec, 1),
            Err(CompileError::EmptyChart { .. })
        ));
    }

    #[test]
    fn test_deterministic() {
        let spec = basic_spec();
        let a = compile(&spec, 1).unwrap();
        let b = compile(&spec, 1).unwrap();
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }
}
