//! Plan construction for one collection cycle.
//!
//! One call turns the reader's flattened series into an ordered action
//! list. The pipeline is: route every series (cache first, selectors
//! second, fallback synthesis last), aggregate routes into per-chart
//! builds, apply lifecycle policy (replacements, caps, expiry), then emit.
//!
//! Emission order is three phases: replacement and cap removals first,
//! then per-chart create/update blocks grouped in ascending chart ID,
//! then expiry removals. A chart removal is always preceded by removals
//! of its remaining dimensions so the emission layer never drops a chart
//! with live value slots.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;

use chartgen_template::{
    Algorithm, ChartMeta, LabelPolicy, Labels, Lifecycle, Program, PromotionMode,
};
use hashbrown::HashSet;
use itertools::Itertools;

use crate::action::{
    CreateChartAction, CreateDimensionAction, DimensionValue, EngineAction, InferredDimension,
    Plan, RemoveChartAction, RemoveDimensionAction, UpdateChartAction,
};
use crate::autogen;
use crate::cache::RouteCache;
use crate::engine::{EngineConfig, StatsCells};
use crate::error::PlanError;
use crate::labels::LabelAccumulator;
use crate::reader::{FlatSeries, SeriesReader};
use crate::route::RouteBinding;
use crate::router::MatchIndex;
use crate::seqguard::{SeqGuard, SeqTransition};
use crate::state::{ChartState, DimState, MaterializedState, should_expire};
use crate::statsd::EngineCounters;

/// Everything one chart instance accumulated over this cycle's series.
struct ChartBuild {
    template_id: String,
    meta: ChartMeta,
    lifecycle: Lifecycle,
    autogen: bool,
    instance_labels: Labels,
    acc: LabelAccumulator,
    dims: BTreeMap<String, DimBuild>,
}

struct DimBuild {
    value: f64,
    hidden: bool,
    algorithm: Algorithm,
    multiplier: i64,
    divisor: i64,
}

impl ChartBuild {
    fn new(program: &Program, binding: &RouteBinding) -> Result<Self, PlanError> {
        let acc = if binding.autogen {
            LabelAccumulator::new(&LabelPolicy {
                mode: PromotionMode::Auto,
                excluded: binding.promote_excluded.clone(),
            })
        } else {
            let chart = program.chart(&binding.template_id).ok_or_else(|| {
                PlanError::UnknownTemplateChart {
                    template_id: binding.template_id.clone(),
                }
            })?;
            LabelAccumulator::new(&chart.labels)
        };
        Ok(Self {
            template_id: binding.template_id.clone(),
            meta: binding.meta.clone(),
            lifecycle: binding.lifecycle,
            autogen: binding.autogen,
            instance_labels: binding.instance_labels.clone(),
            acc,
            dims: BTreeMap::new(),
        })
    }
}

#[expect(clippy::too_many_arguments, reason = "internal entry point")]
pub(crate) fn build_plan(
    program: &Program,
    index: &MatchIndex,
    reader: &dyn SeriesReader,
    cache: &RouteCache,
    state: &mut MaterializedState,
    guard: &mut SeqGuard,
    config: &EngineConfig,
    stats: &StatsCells,
) -> Result<Plan, PlanError> {
    let seq = reader.build_seq();
    match guard.observe(seq) {
        SeqTransition::Broken => {
            chartgen_log::warn!(seq, "build sequence stopped advancing");
        }
        SeqTransition::Recovered => {
            chartgen_log::info!(seq, "build sequence advancing again");
        }
        SeqTransition::None => {}
    }
    // Nothing committed since the last plan, e.g. an aborted collection
    // cycle. Removals must not fire off stale data.
    if seq == 0 || seq <= state.last_seq {
        return Ok(Plan::empty(seq));
    }

    let mut series = reader.flatten();
    series.sort_unstable_by_key(|s| s.series_id);

    let mut live = HashSet::with_capacity(series.len());
    let mut builds: BTreeMap<String, ChartBuild> = BTreeMap::new();
    let mut inferred: BTreeSet<InferredDimension> = BTreeSet::new();

    for s in &series {
        live.insert(s.series_id);
        let routes = match cache.lookup(s.series_id, program.revision, s.first_seen_seq) {
            Some(routes) => {
                stats.route_cache_hits.fetch_add(1, Ordering::Relaxed);
                config.telemetry.count(&EngineCounters::RouteCacheHit, 1);
                routes
            }
            None => {
                stats.route_cache_misses.fetch_add(1, Ordering::Relaxed);
                config.telemetry.count(&EngineCounters::RouteCacheMiss, 1);
                let mut routes = index.route(program, s)?;
                if routes.is_empty() && config.autogen.enabled {
                    if let Some(binding) = autogen::build_route(s, reader, &config.autogen) {
                        stats.autogen_routes_built.fetch_add(1, Ordering::Relaxed);
                        config.telemetry.count(&EngineCounters::AutogenRouteBuilt, 1);
                        routes.push(binding);
                    }
                }
                cache.store(s.series_id, program.revision, s.first_seen_seq, routes.clone());
                routes
            }
        };
        for binding in &routes {
            contribute(program, state, &mut builds, binding, s, &mut inferred)?;
        }
    }
    cache.retain_series(&live);

    let mut actions = Vec::new();

    remove_replaced_charts(state, &builds, &mut actions);
    enforce_instance_caps(program, state, &mut builds, config, &mut actions);
    enforce_dimension_caps(state, &mut builds, config, &mut actions);

    // A build can lose all dimensions to the cap; creating an empty chart
    // would be pointless, but an already materialized one still needs its
    // update so stale slots empty out.
    builds.retain(|chart_id, build| !build.dims.is_empty() || state.charts.contains_key(chart_id));

    let (expired_charts, expired_dims) = collect_expiry(state, &builds, seq);

    emit_observed(state, builds, seq, &expired_dims, &mut actions);
    emit_expiry(state, expired_charts, expired_dims, &mut actions);

    state.last_seq = seq;
    stats.plans_built.fetch_add(1, Ordering::Relaxed);
    config.telemetry.count(&EngineCounters::PlanBuilt, 1);

    Ok(Plan {
        seq,
        actions,
        inferred_dimensions: inferred.into_iter().collect(),
    })
}

/// Folds one route into the per-chart builds.
fn contribute(
    program: &Program,
    state: &MaterializedState,
    builds: &mut BTreeMap<String, ChartBuild>,
    binding: &RouteBinding,
    series: &FlatSeries,
    inferred: &mut BTreeSet<InferredDimension>,
) -> Result<(), PlanError> {
    // A fallback chart never displaces a chart some template materialized
    // in an earlier cycle.
    if binding.autogen
        && state
            .charts
            .get(&binding.chart_id)
            .is_some_and(|cs| cs.template_id != binding.template_id)
    {
        return Ok(());
    }

    let replace = match builds.get(&binding.chart_id) {
        None => true,
        // Within a cycle, a template chart wins any ID collision with a
        // fallback chart, regardless of series order.
        Some(build) if build.autogen && !binding.autogen => true,
        Some(build) => {
            if !build.autogen && binding.autogen {
                return Ok(());
            }
            if build.template_id != binding.template_id {
                chartgen_log::warn!(
                    chart_id = binding.chart_id.as_str(),
                    template_id = binding.template_id.as_str(),
                    other_template_id = build.template_id.as_str(),
                    "distinct templates rendered the same chart ID, keeping the first"
                );
                return Ok(());
            }
            false
        }
    };
    if replace {
        let build = ChartBuild::new(program, binding)?;
        builds.insert(binding.chart_id.clone(), build);
    }
    let Some(build) = builds.get_mut(&binding.chart_id) else {
        return Ok(());
    };

    if let Some(key) = &binding.label_key {
        build.acc.exclude(key);
    }
    build.acc.observe(&series.labels, &binding.instance_labels);

    let dim = build.dims.entry(binding.dim_name.clone()).or_insert(DimBuild {
        value: 0.0,
        hidden: binding.hidden,
        algorithm: binding.algorithm,
        multiplier: binding.multiplier,
        divisor: binding.divisor,
    });
    // Several series can legitimately resolve to the same dimension name,
    // e.g. a from-label name shared by two series. Their values add up.
    dim.value += series.value;

    if binding.inferred && !binding.autogen {
        if let Some(key) = &binding.label_key {
            inferred.insert(InferredDimension {
                chart_id: binding.chart_id.clone(),
                name: binding.dim_name.clone(),
                label_key: key.clone(),
            });
        }
    }
    Ok(())
}

/// Removes materialized charts whose chart ID is now claimed by a
/// different template, making room for the recreate in the same plan.
fn remove_replaced_charts(
    state: &mut MaterializedState,
    builds: &BTreeMap<String, ChartBuild>,
    actions: &mut Vec<EngineAction>,
) {
    let replaced: Vec<String> = builds
        .iter()
        .filter(|(chart_id, build)| {
            state
                .charts
                .get(*chart_id)
                .is_some_and(|cs| cs.template_id != build.template_id)
        })
        .map(|(chart_id, _)| chart_id.clone())
        .collect();
    for chart_id in replaced {
        if let Some(cs) = state.charts.remove(&chart_id) {
            push_chart_removal(actions, &chart_id, &cs);
        }
    }
}

/// Enforces per-template instance caps.
///
/// Instances that received data this cycle are never evicted. Inactive
/// instances go first, oldest last-seen first; if that is not enough the
/// newest would-be instances are dropped before they materialize.
fn enforce_instance_caps(
    program: &Program,
    state: &mut MaterializedState,
    builds: &mut BTreeMap<String, ChartBuild>,
    config: &EngineConfig,
    actions: &mut Vec<EngineAction>,
) {
    let caps: Vec<(String, usize)> = program
        .charts()
        .iter()
        .filter_map(|chart| {
            chart
                .lifecycle
                .max_instances
                .map(|cap| (chart.template_id.clone(), cap))
        })
        .collect();

    for (template_id, cap) in caps {
        let existing: Vec<(u64, String)> = state
            .charts
            .iter()
            .filter(|(_, cs)| cs.template_id == template_id)
            .map(|(chart_id, cs)| (cs.last_seen_seq, chart_id.clone()))
            .collect();
        let new_ids: Vec<String> = builds
            .iter()
            .filter(|(chart_id, build)| {
                build.template_id == template_id && !state.charts.contains_key(*chart_id)
            })
            .map(|(chart_id, _)| chart_id.clone())
            .collect();

        let mut count = existing.len() + new_ids.len();
        if count <= cap {
            continue;
        }

        let victims = existing
            .into_iter()
            .filter(|(_, chart_id)| !builds.contains_key(chart_id))
            .sorted();
        for (_, chart_id) in victims {
            if count <= cap {
                break;
            }
            if let Some(cs) = state.charts.remove(&chart_id) {
                push_chart_removal(actions, &chart_id, &cs);
                count -= 1;
            }
        }

        for chart_id in new_ids.into_iter().rev() {
            if count <= cap {
                break;
            }
            chartgen_log::warn!(
                template_id = template_id.as_str(),
                chart_id = chart_id.as_str(),
                cap,
                "instance cap reached, dropping new chart instance"
            );
            config.telemetry.count(&EngineCounters::InstanceCapDropped, 1);
            builds.remove(&chart_id);
            count -= 1;
        }
    }
}

/// Enforces per-instance dimension caps, same strategy as instance caps.
fn enforce_dimension_caps(
    state: &mut MaterializedState,
    builds: &mut BTreeMap<String, ChartBuild>,
    config: &EngineConfig,
    actions: &mut Vec<EngineAction>,
) {
    let chart_ids: Vec<String> = builds.keys().cloned().collect();
    for chart_id in chart_ids {
        let Some(build) = builds.get(&chart_id) else {
            continue;
        };
        let Some(cap) = build.lifecycle.max_dims else {
            continue;
        };

        let (existing, existing_names) = match state.charts.get(&chart_id) {
            Some(cs) => (
                cs.dims
                    .iter()
                    .map(|(name, dim)| (dim.last_seen_seq, name.clone()))
                    .collect::<Vec<_>>(),
                cs.dims.keys().cloned().collect::<BTreeSet<_>>(),
            ),
            None => (Vec::new(), BTreeSet::new()),
        };
        let new_names: Vec<String> = build
            .dims
            .keys()
            .filter(|name| !existing_names.contains(*name))
            .cloned()
            .collect();

        let mut count = existing.len() + new_names.len();
        if count <= cap {
            continue;
        }

        let victims = existing
            .into_iter()
            .filter(|(_, name)| !build.dims.contains_key(name))
            .sorted();
        for (_, name) in victims {
            if count <= cap {
                break;
            }
            let removed = state
                .charts
                .get_mut(&chart_id)
                .is_some_and(|cs| cs.dims.remove(&name).is_some());
            if removed {
                actions.push(EngineAction::RemoveDimension(RemoveDimensionAction {
                    chart_id: chart_id.clone(),
                    name,
                }));
                count -= 1;
            }
        }

        if count > cap {
            let Some(build) = builds.get_mut(&chart_id) else {
                continue;
            };
            for name in new_names.into_iter().rev() {
                if count <= cap {
                    break;
                }
                chartgen_log::warn!(
                    chart_id = chart_id.as_str(),
                    dimension = name.as_str(),
                    cap,
                    "dimension cap reached, dropping new dimension"
                );
                config.telemetry.count(&EngineCounters::DimensionCapDropped, 1);
                build.dims.remove(&name);
                count -= 1;
            }
        }
    }
}

/// Decides which unobserved charts and dimensions expire this cycle.
fn collect_expiry(
    state: &MaterializedState,
    builds: &BTreeMap<String, ChartBuild>,
    seq: u64,
) -> (Vec<String>, BTreeMap<String, BTreeSet<String>>) {
    let expired_charts: Vec<String> = state
        .charts
        .iter()
        .filter(|(chart_id, cs)| {
            !builds.contains_key(*chart_id)
                && should_expire(cs.last_seen_seq, seq, cs.lifecycle.expire_after_cycles)
        })
        .map(|(chart_id, _)| chart_id.clone())
        .collect();

    let mut expired_dims: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (chart_id, cs) in &state.charts {
        if expired_charts.contains(chart_id) {
            continue;
        }
        let expire = cs.lifecycle.dim_expire_after_cycles;
        if expire == 0 {
            continue;
        }
        let build = builds.get(chart_id);
        for (name, dim) in &cs.dims {
            let observed = build.is_some_and(|b| b.dims.contains_key(name));
            if !observed && should_expire(dim.last_seen_seq, seq, expire) {
                expired_dims
                    .entry(chart_id.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }
    }

    (expired_charts, expired_dims)
}

/// Emits the create/update block of every observed chart, in chart ID
/// order, and commits the observations to the materialized state.
fn emit_observed(
    state: &mut MaterializedState,
    builds: BTreeMap<String, ChartBuild>,
    seq: u64,
    expired_dims: &BTreeMap<String, BTreeSet<String>>,
    actions: &mut Vec<EngineAction>,
) {
    let no_dims = BTreeSet::new();
    for (chart_id, build) in builds {
        if !state.charts.contains_key(&chart_id) {
            let mut labels = build.instance_labels.clone();
            labels.extend(build.acc.finish());
            actions.push(EngineAction::CreateChart(CreateChartAction {
                chart_id: chart_id.clone(),
                template_id: build.template_id.clone(),
                meta: build.meta.clone(),
                labels,
            }));
            state.charts.insert(
                chart_id.clone(),
                ChartState {
                    template_id: build.template_id.clone(),
                    lifecycle: build.lifecycle,
                    last_seen_seq: seq,
                    dims: BTreeMap::new(),
                },
            );
        }
        let Some(cs) = state.charts.get_mut(&chart_id) else {
            continue;
        };
        cs.last_seen_seq = seq;

        for (name, dim) in &build.dims {
            match cs.dims.get_mut(name) {
                Some(existing) => existing.last_seen_seq = seq,
                None => {
                    actions.push(EngineAction::CreateDimension(CreateDimensionAction {
                        chart_id: chart_id.clone(),
                        name: name.clone(),
                        hidden: dim.hidden,
                        algorithm: dim.algorithm,
                        multiplier: dim.multiplier,
                        divisor: dim.divisor,
                    }));
                    cs.dims.insert(name.clone(), DimState { last_seen_seq: seq });
                }
            }
        }

        // Every live dimension gets a slot; unobserved ones empty out,
        // except those already scheduled for removal below.
        let gone = expired_dims.get(&chart_id).unwrap_or(&no_dims);
        let values: Vec<DimensionValue> = cs
            .dims
            .keys()
            .filter(|name| !gone.contains(*name))
            .map(|name| DimensionValue {
                name: name.clone(),
                value: build.dims.get(name).map(|dim| dim.value),
            })
            .collect();
        actions.push(EngineAction::UpdateChart(UpdateChartAction {
            chart_id,
            values,
        }));
    }
}

/// Emits expiry removals and drops the expired entries from the state.
fn emit_expiry(
    state: &mut MaterializedState,
    expired_charts: Vec<String>,
    expired_dims: BTreeMap<String, BTreeSet<String>>,
    actions: &mut Vec<EngineAction>,
) {
    for (chart_id, names) in expired_dims {
        for name in names {
            if let Some(cs) = state.charts.get_mut(&chart_id) {
                cs.dims.remove(&name);
            }
            actions.push(EngineAction::RemoveDimension(RemoveDimensionAction {
                chart_id: chart_id.clone(),
                name,
            }));
        }
    }
    for chart_id in expired_charts {
        if let Some(cs) = state.charts.remove(&chart_id) {
            push_chart_removal(actions, &chart_id, &cs);
        }
    }
}

fn push_chart_removal(actions: &mut Vec<EngineAction>, chart_id: &str, cs: &ChartState) {
    for name in cs.dims.keys() {
        actions.push(EngineAction::RemoveDimension(RemoveDimensionAction {
            chart_id: chart_id.to_owned(),
            name: name.clone(),
        }));
    }
    actions.push(EngineAction::RemoveChart(RemoveChartAction {
        chart_id: chart_id.to_owned(),
    }));
}
