use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use log::debug;
use petgraph::Direction;
use petgraph::visit::EdgeRef;
use serde::Serialize;

use crate::abstraction::abstract_state::AbstractAction;
use crate::engine::config::PlannerConfig;
use crate::graph::transition_model::AbstractTransition;
use crate::model::context::ModelContext;
use crate::model::ids::{StateId, TransitionId, WindowId};
use crate::planner::path::{PathStep, TransitionPath};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Goal {
    State(StateId),
    Window(WindowId),
    /// Reach a state offering this action.
    Action(AbstractAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathConstraints {
    pub allow_reset: bool,
    /// Allow template-backed edges never confirmed at runtime.
    pub allow_static: bool,
    pub max_cost: Option<u32>,
    pub max_results: usize,
    /// Accept any action on the goal action's target element.
    pub any_action_on_target: bool,
}

impl Default for PathConstraints {
    fn default() -> Self {
        Self {
            allow_reset: false,
            allow_static: false,
            max_cost: None,
            max_results: 5,
            any_action_on_target: false,
        }
    }
}

impl PathConstraints {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            max_cost: config.max_cost,
            max_results: config.max_results,
            ..Self::default()
        }
    }

    pub fn allow_reset(mut self, allow: bool) -> Self {
        self.allow_reset = allow;
        self
    }

    pub fn allow_static(mut self, allow: bool) -> Self {
        self.allow_static = allow;
        self
    }
}

/// Which relaxation step produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Relaxation {
    None,
    AllowStatic,
    AllowReset,
    AnyActionOnTarget,
    Exhausted,
}

pub fn edge_weight(transition: &AbstractTransition, weights: &PlannerConfig) -> u32 {
    if transition.is_reset() {
        weights.reset_weight
    } else if transition.implicit {
        weights.implicit_weight
    } else {
        weights.explicit_weight
    }
}

fn eligible(transition: &AbstractTransition, constraints: &PathConstraints) -> bool {
    (constraints.allow_reset || !transition.is_reset())
        && (constraints.allow_static || !transition.is_static_only())
}

/// Search frontier entry. Ordered by cost, then implicit edges, then reset
/// edges, then length, then insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    key: (u32, usize, usize, usize, u64),
    states: Vec<StateId>,
    edges: Vec<TransitionId>,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn satisfies(ctx: &ModelContext, state: StateId, goal: &Goal, constraints: &PathConstraints) -> bool {
    let Some(s) = ctx.states.get(state) else {
        return false;
    };
    match goal {
        Goal::State(target) => state == *target,
        Goal::Window(window) => ctx.windows.active(s.window) == ctx.windows.active(*window),
        Goal::Action(action) => {
            s.has_action(action)
                || (constraints.any_action_on_target
                    && s.actions
                        .iter()
                        .chain(s.input_mapping.keys())
                        .any(|a| a.targets_same_element(action)))
        }
    }
}

/// States some guarded edge depends on. Two prefixes reaching the same state
/// are interchangeable only if they visited the same subset of these.
fn guard_states(ctx: &ModelContext) -> BTreeSet<StateId> {
    ctx.graph
        .iter()
        .filter(|t| t.guarded)
        .flat_map(|t| t.evidence.dependent_states.iter().copied())
        .collect()
}

/// Cheapest simple paths from `from` to `goal` under `constraints`, best
/// first. `history` is the recent trace (oldest first) used to satisfy
/// guards on the first edges. An empty result is a normal outcome.
pub fn find_paths(
    ctx: &ModelContext,
    from: StateId,
    goal: &Goal,
    constraints: &PathConstraints,
    history: &[StateId],
) -> Vec<TransitionPath> {
    if !ctx.states.contains(from) || constraints.max_results == 0 {
        return Vec::new();
    }
    if satisfies(ctx, from, goal, constraints) {
        return vec![TransitionPath::new(from, goal.clone(), Vec::new())];
    }

    let weights = &ctx.config.planner;
    let mut results = Vec::new();
    let dependents = guard_states(ctx);
    let mut pops: HashMap<(StateId, BTreeSet<StateId>), usize> = HashMap::new();
    let mut seq = 0u64;
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(Candidate {
        key: (0, 0, 0, 0, seq),
        states: vec![from],
        edges: Vec::new(),
    }));

    while let Some(Reverse(candidate)) = frontier.pop() {
        let Some(&at) = candidate.states.last() else {
            continue;
        };
        let seen_guards = candidate
            .states
            .iter()
            .filter(|s| dependents.contains(s))
            .copied()
            .collect();
        let popped = pops.entry((at, seen_guards)).or_insert(0);
        if *popped >= constraints.max_results {
            continue;
        }
        *popped += 1;

        if !candidate.edges.is_empty() && satisfies(ctx, at, goal, constraints) {
            results.push(build_path(ctx, from, goal, &candidate.edges));
            if results.len() >= constraints.max_results {
                break;
            }
            continue;
        }

        let (cost, implicit, resets, len, _) = candidate.key;
        for edge in ctx.graph.edges_directed(at, Direction::Outgoing) {
            let t = edge.weight();
            let Some(next) = ctx.graph.state_at(edge.target()) else {
                continue;
            };
            if !eligible(t, constraints) || candidate.states.contains(&next) {
                continue;
            }
            let prefix = history.iter().chain(candidate.states.iter());
            if !t.guard_satisfied_by(prefix) {
                continue;
            }
            let next_cost = cost + edge_weight(t, weights);
            if constraints.max_cost.is_some_and(|max| next_cost > max) {
                continue;
            }

            seq += 1;
            let mut states = candidate.states.clone();
            states.push(next);
            let mut edges = candidate.edges.clone();
            edges.push(t.id);
            frontier.push(Reverse(Candidate {
                key: (
                    next_cost,
                    implicit + usize::from(t.implicit),
                    resets + usize::from(t.is_reset()),
                    len + 1,
                    seq,
                ),
                states,
                edges,
            }));
        }
    }

    debug!("planned {} paths from {} to {:?}", results.len(), from, goal);
    results
}

/// `find_paths`, progressively relaxing the constraints: static-only edges,
/// then reset edges, then any action on the goal's target element.
pub fn find_paths_relaxed(
    ctx: &ModelContext,
    from: StateId,
    goal: &Goal,
    constraints: &PathConstraints,
    history: &[StateId],
) -> (Vec<TransitionPath>, Relaxation) {
    let mut current = constraints.clone();
    let paths = find_paths(ctx, from, goal, &current, history);
    if !paths.is_empty() {
        return (paths, Relaxation::None);
    }

    if !current.allow_static {
        current.allow_static = true;
        let paths = find_paths(ctx, from, goal, &current, history);
        if !paths.is_empty() {
            return (paths, Relaxation::AllowStatic);
        }
    }

    if !current.allow_reset {
        current.allow_reset = true;
        let paths = find_paths(ctx, from, goal, &current, history);
        if !paths.is_empty() {
            return (paths, Relaxation::AllowReset);
        }
    }

    if matches!(goal, Goal::Action(a) if a.target.is_some()) && !current.any_action_on_target {
        current.any_action_on_target = true;
        let paths = find_paths(ctx, from, goal, &current, history);
        if !paths.is_empty() {
            return (paths, Relaxation::AnyActionOnTarget);
        }
    }

    (Vec::new(), Relaxation::Exhausted)
}

fn build_path(ctx: &ModelContext, root: StateId, goal: &Goal, edges: &[TransitionId]) -> TransitionPath {
    let weights = &ctx.config.planner;
    let steps = edges
        .iter()
        .filter_map(|id| {
            let t = ctx.graph.get(*id)?;
            let source = ctx.states.get(t.source)?;
            Some(PathStep {
                transition: t.id,
                source: t.source,
                destination: t.destination,
                action: t.action.clone(),
                weight: edge_weight(t, weights),
                implicit: t.implicit,
                reset: t.is_reset(),
                source_window: source.window,
                inputs: source.input_mapping.get(&t.action).cloned().unwrap_or_default(),
            })
        })
        .collect();
    TransitionPath::new(root, goal.clone(), steps)
}
