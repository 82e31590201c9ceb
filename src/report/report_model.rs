use serde::Serialize;

use crate::model::context::ModelContext;
use crate::refinement::controller::RefinementController;

// ============================================================================
// Model summary: counts and refinement outcome of one run
// ============================================================================

/// Snapshot of the abstract model for reporting.
///
/// Built from a `ModelContext` via `from_context()`; consumed by the
/// console reporter and serialized as JSON by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelSummary {
    pub windows: usize,
    /// Windows not folded into another one.
    pub active_windows: usize,
    pub elements: usize,
    pub inputs: usize,
    /// Inputs with declared handlers never confirmed by coverage.
    pub inputs_with_uncovered_handlers: usize,
    pub observations: usize,
    pub interactions: usize,

    pub states: usize,
    pub transitions: usize,
    pub explicit_transitions: usize,
    pub implicit_transitions: usize,
    pub guarded_transitions: usize,

    pub refinement_rounds: u32,
    pub raised_scopes: Vec<RaisedScope>,
    pub nondeterminism: Vec<String>,
    /// Busiest windows by state count, descending.
    pub states_per_window: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaisedScope {
    pub window: String,
    pub signature: String,
    pub level: String,
}

impl ModelSummary {
    pub fn from_context(ctx: &ModelContext, refinement: &RefinementController) -> Self {
        let mut states_per_window: Vec<(String, usize)> = ctx
            .states_per_window()
            .into_iter()
            .map(|(w, n)| (ctx.windows.label(w), n))
            .collect();
        states_per_window.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            windows: ctx.windows.len(),
            active_windows: ctx.windows.iter().filter(|w| !w.is_retired()).count(),
            elements: ctx.elements.len(),
            inputs: ctx.inputs.len(),
            inputs_with_uncovered_handlers: ctx
                .inputs
                .iter()
                .filter(|i| !i.uncovered_handlers().is_empty())
                .count(),
            observations: ctx.history.observation_count(),
            interactions: ctx.history.interactions().len(),
            states: ctx.states.len(),
            transitions: ctx.graph.len(),
            explicit_transitions: ctx.graph.explicit_count(),
            implicit_transitions: ctx.graph.implicit_count(),
            guarded_transitions: ctx.graph.iter().filter(|t| t.guarded).count(),
            refinement_rounds: refinement.total_rounds(),
            raised_scopes: ctx
                .granularity
                .scopes()
                .map(|(scope, level)| RaisedScope {
                    window: ctx.windows.label(scope.window),
                    signature: scope.signature.clone(),
                    level: format!("{:?}", level),
                })
                .collect(),
            nondeterminism: refinement
                .reports()
                .iter()
                .map(|r| {
                    let destinations: Vec<String> = r.destinations.iter().map(|d| d.to_string()).collect();
                    format!("{} from {} -> {{{}}}", r.action, r.source, destinations.join(", "))
                })
                .collect(),
            states_per_window,
        }
    }
}
