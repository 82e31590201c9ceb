use std::collections::BTreeSet;

use serde::Serialize;

use crate::abstraction::abstract_state::AbstractAction;
use crate::model::ids::{InputId, InteractionId, StateId, TemplateTransitionId, TransitionId, WindowId};

/// Evidence aggregated on a transition. All fields grow monotonically.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransitionEvidence {
    /// Declared handlers confirmed while traversing this edge.
    pub handlers: BTreeSet<String>,
    pub covered_code: BTreeSet<String>,
    /// Set if any traversal reached code never seen before in the run.
    pub new_coverage: bool,
    /// States visited immediately before the source on traversals.
    pub dependent_states: BTreeSet<StateId>,
    pub interactions: Vec<InteractionId>,
    pub inputs: BTreeSet<InputId>,
}

impl TransitionEvidence {
    pub fn merge(&mut self, other: TransitionEvidence) {
        self.handlers.extend(other.handlers);
        self.covered_code.extend(other.covered_code);
        self.new_coverage |= other.new_coverage;
        self.dependent_states.extend(other.dependent_states);
        for x in other.interactions {
            if !self.interactions.contains(&x) {
                self.interactions.push(x);
            }
        }
        self.inputs.extend(other.inputs);
    }
}

/// A directed edge of the abstract graph.
#[derive(Debug, Clone, Serialize)]
pub struct AbstractTransition {
    pub id: TransitionId,
    pub source: StateId,
    pub destination: StateId,
    pub action: AbstractAction,
    /// Most recent different window visited before the source.
    pub prior_window: Option<WindowId>,
    /// Not yet confirmed by a traversal.
    pub implicit: bool,
    /// Static template edge this transition was instantiated from.
    pub template: Option<TemplateTransitionId>,
    /// Only valid after one of `evidence.dependent_states`.
    pub guarded: bool,
    pub evidence: TransitionEvidence,
}

impl AbstractTransition {
    pub fn is_reset(&self) -> bool {
        self.action.is_reset()
    }

    /// Backed only by the static reference graph.
    pub fn is_static_only(&self) -> bool {
        self.implicit && self.template.is_some()
    }

    pub fn is_explicit(&self) -> bool {
        !self.implicit
    }

    /// Whether a path whose visited states are `prefix` may take this edge.
    pub fn guard_satisfied_by<'a, I>(&self, prefix: I) -> bool
    where
        I: IntoIterator<Item = &'a StateId>,
    {
        if !self.guarded || self.evidence.dependent_states.is_empty() {
            return true;
        }
        prefix
            .into_iter()
            .any(|s| self.evidence.dependent_states.contains(s))
    }
}

/// Input to [`AbstractTransitionGraph::record_transition`].
///
/// [`AbstractTransitionGraph::record_transition`]: crate::graph::transition_graph::AbstractTransitionGraph::record_transition
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub source: StateId,
    pub action: AbstractAction,
    pub destination: StateId,
    pub prior_window: Option<WindowId>,
    pub interaction: Option<InteractionId>,
    pub input: Option<InputId>,
    pub coverage: BTreeSet<String>,
    pub new_coverage: bool,
    pub dependent_state: Option<StateId>,
    /// Re-derivation during a rebuild: evidence is unioned again but
    /// exercise counters are not bumped.
    pub replay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordOutcome {
    Created(TransitionId),
    Merged(TransitionId),
    Promoted(TransitionId),
}

impl RecordOutcome {
    pub fn transition(&self) -> TransitionId {
        match self {
            RecordOutcome::Created(t) | RecordOutcome::Merged(t) | RecordOutcome::Promoted(t) => *t,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Created(_) => "created",
            RecordOutcome::Merged(_) => "merged",
            RecordOutcome::Promoted(_) => "promoted",
        }
    }
}
