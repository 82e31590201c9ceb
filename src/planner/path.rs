use std::collections::BTreeSet;

use serde::Serialize;

use crate::abstraction::abstract_state::AbstractAction;
use crate::abstraction::reducer::{is_retained, reduce, ReducerContext};
use crate::abstraction::resolver::find_window;
use crate::graph::transition_graph::AbstractTransitionGraph;
use crate::model::context::ModelContext;
use crate::model::ids::{InputId, StateId, TransitionId, WindowId};
use crate::observation::classifier::classify_screen;
use crate::observation::observation_model::ConcreteObservation;
use crate::planner::planner::Goal;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub transition: TransitionId,
    pub source: StateId,
    pub destination: StateId,
    pub action: AbstractAction,
    pub weight: u32,
    pub implicit: bool,
    pub reset: bool,
    pub source_window: WindowId,
    /// Inputs the source state maps the action to.
    pub inputs: BTreeSet<InputId>,
}

/// Planned sequence of transitions with a traversal cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionPath {
    pub root: StateId,
    pub destination: StateId,
    pub goal: Goal,
    pub steps: Vec<PathStep>,
    pub cost: u32,
    #[serde(skip)]
    cursor: usize,
}

impl TransitionPath {
    pub(crate) fn new(root: StateId, goal: Goal, steps: Vec<PathStep>) -> Self {
        let destination = steps.last().map_or(root, |s| s.destination);
        let cost = steps.iter().map(|s| s.weight).sum();
        Self {
            root,
            destination,
            goal,
            steps,
            cost,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Advance one step; `None` once the path is exhausted.
    pub fn next(&mut self) -> Option<&PathStep> {
        let step = self.steps.get(self.cursor)?;
        self.cursor += 1;
        Some(step)
    }

    pub fn peek(&self) -> Option<&PathStep> {
        self.steps.get(self.cursor)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn implicit_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.implicit).count()
    }

    pub fn reset_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.reset).count()
    }

    /// Each step is a live edge and consecutive steps share their state.
    pub fn is_walk_in(&self, graph: &AbstractTransitionGraph) -> bool {
        let mut at = self.root;
        for step in &self.steps {
            let Some(t) = graph.get(step.transition) else {
                return false;
            };
            if t.source != at || t.source != step.source || t.destination != step.destination {
                return false;
            }
            at = t.destination;
        }
        at == self.destination
    }

    /// Whether the next step can still be taken from this concrete screen:
    /// same window, and the target widget is present either by its key at
    /// current granularity or through a mapped input's element.
    pub fn can_continue_from(&self, ctx: &ModelContext, observation: &ConcreteObservation) -> bool {
        let Some(step) = self.peek() else {
            return false;
        };
        let class = classify_screen(observation, &ctx.config);
        match find_window(&ctx.windows, observation, class) {
            Some(window) if window == ctx.windows.active(step.source_window) => {}
            _ => return false,
        }

        let Some(target) = &step.action.target else {
            return true;
        };

        let window = ctx.windows.active(step.source_window);
        let rctx = ReducerContext::new(window, observation);
        let retained: Vec<_> = observation.widgets.iter().filter(|w| is_retained(w)).collect();

        let by_key = retained.iter().any(|widget| {
            rctx.structural_signature(widget)
                .map(|scope| ctx.granularity.level_of(window, &scope))
                .and_then(|level| reduce(widget, &rctx, level))
                .is_some_and(|key| &key == target)
        });
        if by_key {
            return true;
        }

        step.inputs
            .iter()
            .filter_map(|i| ctx.inputs.get(*i)?.element)
            .filter_map(|e| ctx.elements.get(e))
            .any(|element| {
                retained.iter().any(|widget| {
                    rctx.structural_signature(widget).as_deref() == Some(element.signature.as_str())
                        || (widget.class_name == element.class_name
                            && element.resource_id.is_some()
                            && widget.resource_id == element.resource_id)
                })
            })
    }
}
