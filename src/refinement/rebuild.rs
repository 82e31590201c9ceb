use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::info;
use serde::Serialize;

use crate::abstraction::resolver::{resolve_observation, ResolveMode};
use crate::graph::recorder::derive_transition;
use crate::graph::template::{instantiate_implicit_edges, refresh_reset_anchor};
use crate::model::context::ModelContext;
use crate::model::error::Result;
use crate::model::ids::{InteractionId, ObservationId, StateId, TransitionId, WindowId};
use crate::trace::trace::EngineEvent;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RebuildSummary {
    pub window: Option<WindowId>,
    pub observations: usize,
    pub states_before: usize,
    pub states_after: usize,
    pub pruned: Vec<StateId>,
    pub interactions: usize,
    /// Re-derived edges guarded again because their conflict persists.
    pub guarded: usize,
}

/// Re-resolve every observation of `window` under the current granularity
/// and re-derive the transitions touching its states. Only this window's
/// states and their edges are touched.
pub fn rebuild_window(ctx: &mut ModelContext, window: WindowId) -> Result<RebuildSummary> {
    let old_states = ctx.states.states_of(window);

    let mut observations: BTreeSet<ObservationId> = BTreeSet::new();
    let mut former: BTreeMap<StateId, BTreeSet<ObservationId>> = BTreeMap::new();
    for id in &old_states {
        if let Some(state) = ctx.states.get(*id) {
            if !state.observations.is_empty() {
                former.insert(*id, state.observations.clone());
            }
            observations.extend(state.observations.iter().copied());
        }
    }

    let interactions: BTreeSet<InteractionId> = observations
        .iter()
        .flat_map(|o| ctx.history.interactions_touching(*o).iter().copied())
        .collect();

    // Loaded explicit edges carry no interactions and cannot be re-derived.
    let doomed: BTreeSet<TransitionId> = old_states
        .iter()
        .flat_map(|s| ctx.graph.touching(*s))
        .filter(|t| {
            ctx.graph
                .get(*t)
                .is_some_and(|t| t.implicit || !t.evidence.interactions.is_empty())
        })
        .collect();
    let guarded_interactions: BTreeSet<InteractionId> = doomed
        .iter()
        .filter_map(|id| ctx.graph.get(*id))
        .filter(|t| t.guarded)
        .flat_map(|t| t.evidence.interactions.iter().copied())
        .collect();
    for id in &doomed {
        ctx.graph.remove(*id);
    }

    for obs in &observations {
        ctx.states.detach(*obs);
    }
    for obs in &observations {
        resolve_observation(ctx, *obs, ResolveMode::Rebuild)?;
    }

    let mut remap: HashMap<StateId, BTreeSet<StateId>> = HashMap::new();
    let mut pruned = Vec::new();
    for (id, attached) in &former {
        let orphaned = ctx.states.get(*id).is_some_and(|s| s.observations.is_empty());
        if !orphaned {
            continue;
        }
        let successors: BTreeSet<StateId> = attached
            .iter()
            .filter_map(|o| ctx.states.state_of(*o))
            .collect();
        remap.insert(*id, successors);
        ctx.graph.remove_touching(*id);
        ctx.states.remove(*id);
        pruned.push(*id);
    }
    ctx.graph.remap_dependent_states(&remap);

    for state in ctx.states.states_of(window) {
        instantiate_implicit_edges(ctx, state)?;
    }
    refresh_reset_anchor(ctx)?;

    for x in &interactions {
        if let Some(record) = ctx.history.interaction(*x).cloned() {
            derive_transition(ctx, &record, true)?;
        }
    }
    let guarded = restore_guards(ctx, &guarded_interactions);

    let summary = RebuildSummary {
        window: Some(window),
        observations: observations.len(),
        states_before: old_states.len(),
        states_after: ctx.states.states_of(window).len(),
        pruned,
        interactions: interactions.len(),
        guarded,
    };
    info!(
        "rebuilt {}: {} observations, {} -> {} states, {} pruned, {} guarded",
        ctx.windows.label(window),
        summary.observations,
        summary.states_before,
        summary.states_after,
        summary.pruned.len(),
        summary.guarded
    );
    ctx.emit(EngineEvent::RebuildFinished {
        window,
        observations: summary.observations,
        states_before: summary.states_before,
        states_after: summary.states_after,
        pruned: summary.pruned.clone(),
        interactions: summary.interactions,
    });
    Ok(summary)
}

/// Guard the re-derived edges of formerly guarded interactions, together
/// with their siblings, while those siblings still disagree on the
/// destination. Returns the number of guarded edges.
fn restore_guards(ctx: &mut ModelContext, interactions: &BTreeSet<InteractionId>) -> usize {
    let mut guarded: BTreeSet<TransitionId> = BTreeSet::new();
    for x in interactions {
        let Some(id) = ctx.graph.transition_for_interaction(*x) else {
            continue;
        };
        if guarded.contains(&id) {
            continue;
        }
        let siblings = ctx.graph.siblings(id);
        let destinations: BTreeSet<StateId> = siblings
            .iter()
            .filter_map(|t| ctx.graph.get(*t))
            .map(|t| t.destination)
            .collect();
        if destinations.len() > 1 {
            guarded.extend(siblings);
        }
    }
    let guarded: Vec<TransitionId> = guarded.into_iter().collect();
    ctx.graph.mark_guarded(&guarded);
    guarded.len()
}

/// Prune loaded states that no observation confirmed and no explicit edge
/// references. Run when the trace returns to the launcher.
pub fn collect_garbage(ctx: &mut ModelContext) -> Vec<StateId> {
    let doomed: Vec<StateId> = ctx
        .states
        .iter()
        .filter(|s| s.loaded && s.observations.is_empty())
        .filter(|s| {
            !ctx.graph.outgoing(s.id).any(|t| t.is_explicit())
                && !ctx.graph.incoming(s.id).any(|t| t.is_explicit())
        })
        .map(|s| s.id)
        .collect();

    for id in &doomed {
        ctx.graph.remove_touching(*id);
        ctx.states.remove(*id);
    }
    if !doomed.is_empty() {
        info!("collected {} unconfirmed states", doomed.len());
        ctx.emit(EngineEvent::StatesCollected {
            states: doomed.clone(),
        });
    }
    doomed
}
