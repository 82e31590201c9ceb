use std::collections::BTreeSet;

use log::{info, warn};
use serde::Serialize;

use crate::abstraction::abstract_state::AbstractAction;
use crate::abstraction::granularity::{GranularityRaise, GranularityScope};
use crate::abstraction::reducer::{is_retained, structural_signature, Attribute, ReducerContext};
use crate::model::context::ModelContext;
use crate::model::error::Result;
use crate::model::ids::{InteractionId, StateId, TransitionId, WindowId};
use crate::refinement::rebuild::{rebuild_window, RebuildSummary};
use crate::trace::trace::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefinementPhase {
    Stable,
    Refining,
}

/// Nondeterminism that survived refinement: the same abstract transition
/// reaches different states and no level can be raised any more.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NondeterminismReport {
    pub interaction: InteractionId,
    pub source: StateId,
    pub action: AbstractAction,
    pub prior_window: Option<WindowId>,
    pub destinations: Vec<StateId>,
    pub transitions: Vec<TransitionId>,
    pub rounds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefinementOutcome {
    pub rounds: u32,
    pub raised: Vec<GranularityRaise>,
    pub rebuilds: Vec<RebuildSummary>,
    pub exhausted: bool,
}

/// Explicit transitions sharing (source, action, prior window) with the
/// transition of one interaction, when they disagree on the destination.
#[derive(Debug, Clone)]
struct Conflict {
    source: StateId,
    window: WindowId,
    action: AbstractAction,
    prior_window: Option<WindowId>,
    transitions: Vec<TransitionId>,
    destinations: BTreeSet<StateId>,
}

/// Lazy refinement loop: validates after each recorded transition and
/// raises granularity until the abstraction is deterministic again or
/// nothing can be raised.
#[derive(Debug)]
pub struct RefinementController {
    phase: RefinementPhase,
    reports: Vec<NondeterminismReport>,
    total_rounds: u32,
}

impl Default for RefinementController {
    fn default() -> Self {
        Self::new()
    }
}

impl RefinementController {
    pub fn new() -> Self {
        Self {
            phase: RefinementPhase::Stable,
            reports: Vec::new(),
            total_rounds: 0,
        }
    }

    pub fn phase(&self) -> RefinementPhase {
        self.phase
    }

    pub fn reports(&self) -> &[NondeterminismReport] {
        &self.reports
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Whether the transition of `interaction` agrees with its siblings.
    pub fn is_consistent(ctx: &ModelContext, interaction: InteractionId) -> bool {
        find_conflict(ctx, interaction).is_none()
    }

    pub fn after_record(
        &mut self,
        ctx: &mut ModelContext,
        interaction: InteractionId,
    ) -> Result<Option<RefinementOutcome>> {
        let Some(mut conflict) = find_conflict(ctx, interaction) else {
            self.phase = RefinementPhase::Stable;
            return Ok(None);
        };

        let accepted = conflict
            .transitions
            .iter()
            .any(|t| ctx.graph.get(*t).is_some_and(|t| t.guarded));
        if accepted {
            ctx.graph.mark_guarded(&conflict.transitions);
            return Ok(None);
        }

        let mut outcome = RefinementOutcome::default();
        loop {
            info!(
                "inconsistent {} from {}: {} destinations",
                conflict.action,
                conflict.source,
                conflict.destinations.len()
            );
            ctx.emit(EngineEvent::InconsistencyDetected {
                interaction,
                source: conflict.source,
                action: conflict.action.to_string(),
                destinations: conflict.destinations.iter().copied().collect(),
            });

            let raised = if outcome.rounds < ctx.config.refinement.max_rounds {
                raise_for(ctx, &conflict)
            } else {
                Vec::new()
            };
            if raised.is_empty() {
                self.accept(ctx, interaction, &conflict, outcome.rounds);
                outcome.exhausted = true;
                return Ok(Some(outcome));
            }

            self.phase = RefinementPhase::Refining;
            outcome.rounds += 1;
            self.total_rounds += 1;
            for r in &raised {
                info!("raised {} {} {:?} -> {:?}", ctx.windows.label(r.scope.window), r.scope.signature, r.from, r.to);
                ctx.emit(EngineEvent::GranularityRaised {
                    window: r.scope.window,
                    signature: r.scope.signature.clone(),
                    from: r.from,
                    to: r.to,
                });
            }
            outcome.raised.extend(raised);
            outcome.rebuilds.push(rebuild_window(ctx, conflict.window)?);
            self.refresh_reports(ctx);

            match find_conflict(ctx, interaction) {
                Some(next) => conflict = next,
                None => {
                    self.phase = RefinementPhase::Stable;
                    return Ok(Some(outcome));
                }
            }
        }
    }

    fn accept(&mut self, ctx: &mut ModelContext, interaction: InteractionId, conflict: &Conflict, rounds: u32) {
        ctx.graph.mark_guarded(&conflict.transitions);
        warn!(
            "unresolved nondeterminism: {} from {} reaches {:?}",
            conflict.action, conflict.source, conflict.destinations
        );
        ctx.emit(EngineEvent::RefinementExhausted {
            source: conflict.source,
            action: conflict.action.to_string(),
            destinations: conflict.destinations.iter().copied().collect(),
            rounds,
        });
        self.reports.push(NondeterminismReport {
            interaction,
            source: conflict.source,
            action: conflict.action.clone(),
            prior_window: conflict.prior_window,
            destinations: conflict.destinations.iter().copied().collect(),
            transitions: conflict.transitions.clone(),
            rounds,
        });
        self.phase = RefinementPhase::Stable;
    }

    /// Re-point reports at the edges their interaction maps to after a
    /// rebuild replaced them. Reports whose conflict a later raise separated
    /// are dropped.
    fn refresh_reports(&mut self, ctx: &ModelContext) {
        self.reports.retain_mut(|report| {
            let Some(conflict) = find_conflict(ctx, report.interaction) else {
                info!("nondeterminism of {} from {} no longer observed", report.action, report.source);
                return false;
            };
            report.source = conflict.source;
            report.destinations = conflict.destinations.iter().copied().collect();
            report.transitions = conflict.transitions;
            true
        });
    }
}

fn find_conflict(ctx: &ModelContext, interaction: InteractionId) -> Option<Conflict> {
    let id = ctx.graph.transition_for_interaction(interaction)?;
    let transition = ctx.graph.get(id)?;
    let transitions = ctx.graph.siblings(id);
    let destinations: BTreeSet<StateId> = transitions
        .iter()
        .filter_map(|t| ctx.graph.get(*t))
        .map(|t| t.destination)
        .collect();
    if destinations.len() <= 1 {
        return None;
    }
    let window = ctx
        .states
        .get(transition.source)
        .map(|s| ctx.windows.active(s.window))?;
    Some(Conflict {
        source: transition.source,
        window,
        action: transition.action.clone(),
        prior_window: transition.prior_window,
        transitions,
        destinations,
    })
}

/// Raise the acted-on element's scope first. When it is exhausted, raise
/// every retained widget scope of the conflicting source observations.
fn raise_for(ctx: &mut ModelContext, conflict: &Conflict) -> Vec<GranularityRaise> {
    if let Some(target) = &conflict.action.target {
        if let Some(class_name) = target.get(Attribute::ClassName) {
            let signature = structural_signature(
                target.get(Attribute::AncestorPath).unwrap_or_default(),
                class_name,
                target.get(Attribute::ResourceId),
            );
            let scope = GranularityScope::new(conflict.window, signature);
            if let Some(raise) = ctx.granularity.raise(&scope) {
                return vec![raise];
            }
        }
    }

    let mut scopes: BTreeSet<GranularityScope> = BTreeSet::new();
    for t in conflict.transitions.iter().filter_map(|t| ctx.graph.get(*t)) {
        for x in &t.evidence.interactions {
            let Some(observation) = ctx
                .history
                .interaction(*x)
                .and_then(|r| ctx.history.observation(r.source))
            else {
                continue;
            };
            let rctx = ReducerContext::new(conflict.window, observation);
            for widget in observation.widgets.iter().filter(|w| is_retained(w)) {
                if let Some(signature) = rctx.structural_signature(widget) {
                    scopes.insert(GranularityScope::new(conflict.window, signature));
                }
            }
        }
    }

    scopes
        .iter()
        .filter_map(|scope| ctx.granularity.raise(scope))
        .collect()
}
