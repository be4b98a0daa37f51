//! The series router: selector matching plus identity rendering.
//!
//! [`MatchIndex`] is rebuilt once per program load. Dimension rules with
//! an exact metric-name constraint are bucketed by name so routing a
//! series only evaluates the few candidates that can possibly match;
//! rules without an exact name go into a wildcard bucket probed for every
//! series.

use hashbrown::HashMap;

use chartgen_template::{Chart, Program, render_chart_id};

use crate::error::PlanError;
use crate::naming::resolve_dimension_name;
use crate::reader::FlatSeries;
use crate::route::{RouteBinding, RouteList};

#[derive(Debug, Clone, Copy)]
struct Candidate {
    chart_index: usize,
    dim_index: usize,
}

/// An index over a program's dimension selectors.
#[derive(Debug, Default)]
pub(crate) struct MatchIndex {
    by_name: HashMap<String, Vec<Candidate>>,
    wildcard: Vec<Candidate>,
}

impl MatchIndex {
    /// Builds the index for a program.
    pub fn build(program: &Program) -> Self {
        let mut index = Self::default();
        for (chart_index, chart) in program.charts().iter().enumerate() {
            for (dim_index, rule) in chart.dimensions.iter().enumerate() {
                let candidate = Candidate {
                    chart_index,
                    dim_index,
                };
                match rule.selector.metric_name() {
                    Some(name) => index
                        .by_name
                        .entry(name.to_owned())
                        .or_default()
                        .push(candidate),
                    None => index.wildcard.push(candidate),
                }
            }
        }
        index
    }

    /// Routes one series to all template dimensions it feeds.
    ///
    /// The result is deterministic: bindings are sorted by chart ID,
    /// template ID, dimension index and dimension name. An empty list
    /// means no template matched and the fallback path may take over.
    pub fn route(&self, program: &Program, series: &FlatSeries) -> Result<RouteList, PlanError> {
        let mut routes = RouteList::new();

        let named = self.by_name.get(&series.name).map(Vec::as_slice);
        for candidate in named.unwrap_or_default().iter().chain(&self.wildcard) {
            let chart = &program.charts()[candidate.chart_index];
            self.try_bind(chart, *candidate, series, &mut routes)?;
        }

        routes.sort_by(|a, b| {
            (&a.chart_id, &a.template_id, a.dim_index, &a.dim_name).cmp(&(
                &b.chart_id,
                &b.template_id,
                b.dim_index,
                &b.dim_name,
            ))
        });
        Ok(routes)
    }

    fn try_bind(
        &self,
        chart: &Chart,
        candidate: Candidate,
        series: &FlatSeries,
        routes: &mut RouteList,
    ) -> Result<(), PlanError> {
        let rule = &chart.dimensions[candidate.dim_index];
        if !rule.selector.matches(&series.name, &series.labels) {
            return Ok(());
        }
        // A missing instance label means this series does not materialize
        // an instance of the chart.
        let Some(identity) = render_chart_id(&chart.identity, &series.labels) else {
            return Ok(());
        };
        let Some(resolved) = resolve_dimension_name(rule, series)? else {
            return Ok(());
        };

        routes.push(RouteBinding {
            template_id: chart.template_id.clone(),
            chart_id: identity.chart_id,
            dim_index: candidate.dim_index,
            dim_name: resolved.name,
            label_key: resolved.label_key,
            inferred: resolved.inferred,
            hidden: rule.hidden,
            algorithm: rule.algorithm,
            multiplier: rule.multiplier,
            divisor: rule.divisor,
            dynamic: rule.dynamic,
            autogen: false,
            meta: chart.meta.clone(),
            lifecycle: chart.lifecycle,
            instance_labels: identity.instance_labels,
            promote_excluded: Default::default(),
        });
        Ok(())
    }
}
