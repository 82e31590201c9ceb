use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info, warn};
use serde::Serialize;

use crate::abstraction::abstract_state::{AbstractAction, AbstractState};
use crate::abstraction::reducer::static_key;
use crate::model::context::ModelContext;
use crate::model::error::{ModelError, Result};
use crate::model::ids::{ElementId, InputId, StateId, TemplateStateId, TemplateTransitionId, TransitionId, WindowId};
use crate::model::window::WindowKind;
use crate::observation::observation_model::ActionKind;
use crate::trace::trace::EngineEvent;

// ============================================================================
// Static reference graph
// ============================================================================

/// Static stand-in for the abstract states of one window.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateState {
    pub id: TemplateStateId,
    pub window: WindowId,
    /// Created for a window the static artifact did not know about.
    pub runtime_created: bool,
}

/// Declared window-to-window edge from offline analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateTransition {
    pub id: TemplateTransitionId,
    pub source: WindowId,
    pub destination: WindowId,
    pub event: ActionKind,
    pub element: Option<ElementId>,
    pub input: Option<InputId>,
    /// Inter-window dependency weight from the artifact.
    pub weight: u32,
}

/// Template graph, one template state per window. Edges are instantiated
/// into implicit abstract transitions as matching states appear.
#[derive(Debug, Default)]
pub struct StaticReferenceGraph {
    states: BTreeMap<TemplateStateId, TemplateState>,
    by_window: HashMap<WindowId, TemplateStateId>,
    transitions: BTreeMap<TemplateTransitionId, TemplateTransition>,
    merged: BTreeSet<WindowId>,
    next_state: u32,
    next_transition: u32,
}

impl StaticReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template_for(&self, window: WindowId) -> Option<TemplateStateId> {
        self.by_window.get(&window).copied()
    }

    pub fn get_or_create_template(&mut self, window: WindowId, runtime_created: bool) -> (TemplateStateId, bool) {
        if let Some(id) = self.template_for(window) {
            return (id, false);
        }
        let id = TemplateStateId(self.next_state);
        self.next_state += 1;
        self.states.insert(
            id,
            TemplateState {
                id,
                window,
                runtime_created,
            },
        );
        self.by_window.insert(window, id);
        (id, true)
    }

    pub fn state(&self, id: TemplateStateId) -> Option<&TemplateState> {
        self.states.get(&id)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Add a declared edge; identical declarations collapse to one.
    pub fn add_transition(
        &mut self,
        source: WindowId,
        destination: WindowId,
        event: ActionKind,
        element: Option<ElementId>,
        input: Option<InputId>,
        weight: u32,
    ) -> TemplateTransitionId {
        self.get_or_create_template(source, false);
        self.get_or_create_template(destination, false);

        let existing = self.transitions.values().find(|t| {
            t.source == source && t.destination == destination && t.event == event && t.element == element
        });
        if let Some(t) = existing {
            return t.id;
        }

        let id = TemplateTransitionId(self.next_transition);
        self.next_transition += 1;
        self.transitions.insert(
            id,
            TemplateTransition {
                id,
                source,
                destination,
                event,
                element,
                input,
                weight,
            },
        );
        id
    }

    pub fn transition(&self, id: TemplateTransitionId) -> Option<&TemplateTransition> {
        self.transitions.get(&id)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TemplateTransition> {
        self.transitions.values()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn outgoing(&self, window: WindowId) -> impl Iterator<Item = &TemplateTransition> {
        self.transitions.values().filter(move |t| t.source == window)
    }

    pub fn incoming(&self, window: WindowId) -> impl Iterator<Item = &TemplateTransition> {
        self.transitions.values().filter(move |t| t.destination == window)
    }

    pub fn is_merged(&self, window: WindowId) -> bool {
        self.merged.contains(&window)
    }

    fn mark_merged(&mut self, window: WindowId) {
        self.merged.insert(window);
    }

    /// Forget that a window's templates were merged; the next state created
    /// for it merges again.
    pub fn invalidate(&mut self, window: WindowId) {
        self.merged.remove(&window);
    }

    /// Move every edge of `from` onto `to`, rewriting element and input ids.
    fn redirect(
        &mut self,
        from: WindowId,
        to: WindowId,
        elements: &HashMap<ElementId, ElementId>,
        inputs: &HashMap<InputId, InputId>,
    ) -> usize {
        self.get_or_create_template(to, false);
        let mut moved = 0;
        for t in self.transitions.values_mut() {
            let mut touched = false;
            if t.source == from {
                t.source = to;
                touched = true;
            }
            if t.destination == from {
                t.destination = to;
                touched = true;
            }
            if let Some(e) = t.element.and_then(|e| elements.get(&e)) {
                t.element = Some(*e);
            }
            if let Some(i) = t.input.and_then(|i| inputs.get(&i)) {
                t.input = Some(*i);
            }
            if touched {
                moved += 1;
            }
        }
        moved
    }
}

// ============================================================================
// Merge and fold
// ============================================================================

/// Bridge the static graph into the dynamic one for `window`. Foldable
/// windows are folded into their owner first, and the owner's own foldable
/// windows are folded before its templates are used. Returns the template
/// edges leaving the (active) window.
pub fn merge_template(ctx: &mut ModelContext, window: WindowId) -> Result<Vec<TemplateTransitionId>> {
    let mut window = ctx.windows.active(window);
    let info = ctx
        .windows
        .get(window)
        .map(|w| (w.kind, w.owner))
        .ok_or(ModelError::UnknownWindow(window))?;

    if ctx.config.fold_options_menus {
        if let (true, Some(owner)) = (info.0.is_foldable(), info.1) {
            let owner = ctx.windows.active(owner);
            fold_window(ctx, window, owner)?;
            window = ctx.windows.active(window);
        }
        for menu in ctx.windows.owned_by(window, WindowKind::OptionsMenu) {
            fold_window(ctx, menu, window)?;
        }
    }

    if !ctx.templates.is_merged(window) {
        if ctx.templates.template_for(window).is_none() {
            let kind = ctx.windows.get(window).map(|w| w.kind);
            if kind.is_some_and(|k| k.is_app_window()) {
                warn!("no static node for window {}; creating one", ctx.windows.label(window));
            }
            ctx.templates.get_or_create_template(window, true);
        }
        ctx.templates.mark_merged(window);
        debug!("merged templates of {}", ctx.windows.label(window));
    }

    Ok(ctx.templates.outgoing(window).map(|t| t.id).collect())
}

/// Fold `window` into `into`: elements and inputs are re-pointed (and
/// deduplicated), template edges redirected, and the window retired.
pub fn fold_window(ctx: &mut ModelContext, window: WindowId, into: WindowId) -> Result<()> {
    if window == into || !ctx.windows.is_active(window) {
        return Ok(());
    }
    let folded = ctx
        .windows
        .get(window)
        .cloned()
        .ok_or(ModelError::UnknownWindow(window))?;

    let mut element_remap = HashMap::new();
    for e in &folded.elements {
        let kept = ctx.elements.reparent(*e, into)?;
        element_remap.insert(*e, kept);
        ctx.windows.get_mut(into)?.elements.insert(kept);
    }

    let mut input_remap = HashMap::new();
    for i in &folded.inputs {
        let element = ctx
            .inputs
            .get(*i)
            .and_then(|input| input.element)
            .map(|e| element_remap.get(&e).copied().unwrap_or(e));
        let kept = ctx.inputs.repoint(*i, into, element)?;
        input_remap.insert(*i, kept);
        ctx.windows.get_mut(into)?.inputs.insert(kept);
    }

    {
        let retired = ctx.windows.get_mut(window)?;
        retired.elements.clear();
        retired.inputs.clear();
    }

    ctx.templates
        .redirect(window, into, &element_remap, &input_remap);
    for id in ctx.states.ids() {
        let state = ctx.states.get_mut(id)?;
        for inputs in state.input_mapping.values_mut() {
            *inputs = inputs
                .iter()
                .map(|i| input_remap.get(i).copied().unwrap_or(*i))
                .collect();
        }
    }
    ctx.graph.remap_inputs(&input_remap);
    ctx.windows.retire(window, into)?;
    ctx.templates.invalidate(into);

    info!(
        "folded {} into {} ({} elements, {} inputs)",
        ctx.windows.label(window),
        ctx.windows.label(into),
        element_remap.len(),
        input_remap.len()
    );
    ctx.emit(EngineEvent::WindowFolded {
        window,
        into,
        elements: element_remap.len(),
        inputs: input_remap.len(),
    });

    for state in ctx.states.states_of(into) {
        instantiate_implicit_edges(ctx, state)?;
    }
    Ok(())
}

// ============================================================================
// Implicit edges
// ============================================================================

/// Copy template edges touching the state's window into implicit
/// transitions, in both directions, plus the implicit reset edge.
pub fn instantiate_implicit_edges(ctx: &mut ModelContext, state: StateId) -> Result<usize> {
    let window = ctx
        .states
        .get(state)
        .map(|s| ctx.windows.active(s.window))
        .ok_or(ModelError::UnknownState(state))?;
    let mut added = 0;

    let outgoing: Vec<TemplateTransition> = ctx.templates.outgoing(window).cloned().collect();
    for tt in outgoing {
        let action = template_action(ctx, &tt, state);
        register_template_input(ctx, state, &action, tt.input)?;
        let destination = ctx.windows.active(tt.destination);
        for dest in ctx.states.states_of(destination) {
            if dest != state && ctx.graph.add_implicit(state, action.clone(), dest, Some(tt.id)).is_some() {
                added += 1;
            }
        }
    }

    let incoming: Vec<TemplateTransition> = ctx.templates.incoming(window).cloned().collect();
    for tt in incoming {
        let origin = ctx.windows.active(tt.source);
        for src in ctx.states.states_of(origin) {
            if src == state {
                continue;
            }
            let action = template_action(ctx, &tt, src);
            register_template_input(ctx, src, &action, tt.input)?;
            if ctx.graph.add_implicit(src, action, state, Some(tt.id)).is_some() {
                added += 1;
            }
        }
    }

    if let Some(anchor) = ctx.reset_anchor_state() {
        if anchor != state {
            let action = reset_action_for(ctx.states.get(state).ok_or(ModelError::UnknownState(state))?);
            if ctx.graph.add_implicit(state, action, anchor, None).is_some() {
                added += 1;
            }
        }
    }

    Ok(added)
}

/// Point every state's implicit reset edge at the current anchor. Stale
/// implicit reset edges to an older anchor are dropped.
pub fn refresh_reset_anchor(ctx: &mut ModelContext) -> Result<usize> {
    let Some(anchor) = ctx.reset_anchor_state() else {
        return Ok(0);
    };

    let stale: Vec<TransitionId> = ctx
        .graph
        .iter()
        .filter(|t| t.implicit && t.template.is_none() && t.is_reset() && t.destination != anchor)
        .map(|t| t.id)
        .collect();
    for id in stale {
        ctx.graph.remove(id);
    }

    let mut added = 0;
    for id in ctx.states.ids() {
        if id == anchor {
            continue;
        }
        let action = reset_action_for(ctx.states.get(id).ok_or(ModelError::UnknownState(id))?);
        if ctx.graph.add_implicit(id, action, anchor, None).is_some() {
            added += 1;
        }
    }
    Ok(added)
}

/// Home and app-stopped states restart with a launch, others with a reset.
pub fn reset_action_for(state: &AbstractState) -> AbstractAction {
    if state.flags.home || state.flags.app_stopped {
        AbstractAction::window_level(ActionKind::Launch)
    } else {
        AbstractAction::window_level(ActionKind::Reset)
    }
}

/// Abstract action of a template edge as seen from `source`: the state's own
/// key for the element when present, otherwise the element's static key.
fn template_action(ctx: &ModelContext, tt: &TemplateTransition, source: StateId) -> AbstractAction {
    let target = tt.element.and_then(|e| ctx.elements.get(e)).map(|element| {
        ctx.states
            .get(source)
            .and_then(|s| s.key_matching(&element.class_name, element.resource_id.as_deref()))
            .cloned()
            .unwrap_or_else(|| static_key(&element.class_name, element.resource_id.as_deref()))
    });
    match target {
        Some(key) => AbstractAction::on(tt.event, key),
        None => AbstractAction::window_level(tt.event),
    }
}

fn register_template_input(
    ctx: &mut ModelContext,
    state: StateId,
    action: &AbstractAction,
    input: Option<InputId>,
) -> Result<()> {
    let state = ctx.states.get_mut(state)?;
    state.actions.insert(action.clone());
    if let Some(input) = input {
        state
            .input_mapping
            .entry(action.clone())
            .or_default()
            .insert(input);
    }
    Ok(())
}
