use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::abstraction::abstract_state::{StateFlags, StateSignature};
use crate::abstraction::reducer::{is_retained, reduce, AbstractionKey, ReducerContext};
use crate::graph::template::{fold_window, instantiate_implicit_edges, merge_template};
use crate::model::context::ModelContext;
use crate::model::element::NewElement;
use crate::model::error::{ModelError, Result};
use crate::model::ids::{ObservationId, StateId, WindowId};
use crate::model::window::{WindowKind, WindowRegistry};
use crate::observation::classifier::{classify_screen, infer_window_kind, special_window, ScreenClass};
use crate::observation::normalize::normalize_text;
use crate::observation::observation_model::ConcreteObservation;
use crate::trace::trace::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// First resolution of a fresh observation; counts a visit.
    Live,
    /// Re-resolution during a rebuild.
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub state: StateId,
    pub window: WindowId,
    pub created: bool,
}

/// Resolve a logged observation to its abstract state, creating the window,
/// runtime elements and state on first sight.
pub fn resolve_observation(ctx: &mut ModelContext, id: ObservationId, mode: ResolveMode) -> Result<Resolution> {
    let observation = ctx
        .history
        .observation(id)
        .cloned()
        .ok_or_else(|| ModelError::UnknownObservation(id.to_string()))?;

    let class = classify_screen(&observation, &ctx.config);
    let window = ensure_window(ctx, &observation, class)?;

    if !class.is_special() {
        register_elements(ctx, window, &observation)?;
    }

    let (signature, counts) = compute_signature(ctx, window, &observation, class);
    let class_name = ctx
        .windows
        .get(window)
        .map(|w| w.class_name.clone())
        .unwrap_or_default();
    let hash = signature.hash_with(&class_name);

    let (state, created) = ctx.states.get_or_create(signature, counts, hash.clone());
    ctx.states.attach(state, id)?;
    ctx.history.set_window(id, window);
    if mode == ResolveMode::Live {
        ctx.states.record_visit(state, window);
    }

    if created {
        debug!("new state {} in {} ({})", state, ctx.windows.label(window), &hash[..12.min(hash.len())]);
        ctx.emit(EngineEvent::StateCreated { state, window, hash });
        merge_template(ctx, window)?;
        instantiate_implicit_edges(ctx, state)?;
    } else {
        debug!("{} resolved to existing state {}", id, state);
    }

    Ok(Resolution { state, window, created })
}

/// State the observation would resolve to, without touching the model.
pub fn peek_state(ctx: &ModelContext, observation: &ConcreteObservation) -> Option<StateId> {
    let (signature, _) = preview_signature(ctx, observation)?;
    ctx.states.find(&signature)
}

/// Signature under the current granularity, or `None` when the window is not
/// known yet.
pub fn preview_signature(
    ctx: &ModelContext,
    observation: &ConcreteObservation,
) -> Option<(StateSignature, BTreeMap<AbstractionKey, u32>)> {
    let class = classify_screen(observation, &ctx.config);
    let window = find_window(&ctx.windows, observation, class)?;
    Some(compute_signature(ctx, window, observation, class))
}

/// Active window an observation belongs to, if it exists.
pub fn find_window(windows: &WindowRegistry, observation: &ConcreteObservation, class: ScreenClass) -> Option<WindowId> {
    let id = match special_window(class) {
        Some((kind, name)) => windows.find(kind, name),
        None => windows.find(infer_window_kind(observation), &observation.window),
    }?;
    Some(windows.active(id))
}

fn ensure_window(ctx: &mut ModelContext, observation: &ConcreteObservation, class: ScreenClass) -> Result<WindowId> {
    if let Some((kind, name)) = special_window(class) {
        let (id, _) = ctx.windows.get_or_create(kind, name, true);
        return Ok(id);
    }

    let kind = infer_window_kind(observation);
    let (id, _) = ctx.windows.get_or_create(kind, &observation.window, true);

    if let Some(owner_class) = observation.owner_window.as_deref().filter(|o| !o.is_empty()) {
        let has_owner = ctx.windows.get(id).is_some_and(|w| w.owner.is_some());
        if !has_owner && kind.is_overlay() {
            let owner = match ctx.windows.find_by_class(owner_class) {
                Some(o) => o,
                None => ctx.windows.get_or_create(WindowKind::Activity, owner_class, true).0,
            };
            ctx.windows.set_owner(id, owner)?;
        }
    }

    if ctx.config.fold_options_menus && kind.is_foldable() && ctx.windows.is_active(id) {
        if let Some(owner) = ctx.windows.get(id).and_then(|w| w.owner) {
            let owner = ctx.windows.active(owner);
            fold_window(ctx, id, owner)?;
        }
    }

    Ok(ctx.windows.active(id))
}

/// Match retained widgets to elements of the window, creating runtime
/// elements for widgets the static artifact did not declare.
fn register_elements(ctx: &mut ModelContext, window: WindowId, observation: &ConcreteObservation) -> Result<()> {
    let rctx = ReducerContext::new(window, observation);
    let mut by_index = HashMap::new();

    for widget in observation.widgets.iter().filter(|w| is_retained(w)) {
        let Some(signature) = rctx.structural_signature(widget) else {
            continue;
        };
        let existing = ctx.elements.match_widget(
            window,
            &signature,
            &widget.class_name,
            widget.resource_id.as_deref(),
        );
        let id = match existing {
            Some(id) => id,
            None => {
                let parent = widget.parent.and_then(|p| by_index.get(&p).copied());
                ctx.elements
                    .insert(NewElement {
                        window,
                        signature: &signature,
                        class_name: &widget.class_name,
                        resource_id: widget.resource_id.as_deref(),
                        parent,
                        runtime_created: true,
                    })
                    .0
            }
        };
        if let Some(text) = widget.text.as_deref().and_then(normalize_text) {
            if !widget.editable {
                ctx.elements.add_text(id, &text);
            }
        }
        ctx.windows.get_mut(window)?.elements.insert(id);
        by_index.insert(widget.index, id);
    }
    Ok(())
}

fn compute_signature(
    ctx: &ModelContext,
    window: WindowId,
    observation: &ConcreteObservation,
    class: ScreenClass,
) -> (StateSignature, BTreeMap<AbstractionKey, u32>) {
    if class.is_special() {
        let flags = StateFlags {
            home: class == ScreenClass::Home,
            app_stopped: class == ScreenClass::AppStopped,
            out_of_scope: matches!(class, ScreenClass::OutOfScope(_)),
            ..StateFlags::default()
        };
        let signature = StateSignature {
            window,
            keys: Default::default(),
            flags,
        };
        return (signature, BTreeMap::new());
    }

    let rctx = ReducerContext::new(window, observation);
    let mut counts: BTreeMap<AbstractionKey, u32> = BTreeMap::new();
    for widget in observation.widgets.iter().filter(|w| is_retained(w)) {
        let Some(scope) = rctx.structural_signature(widget) else {
            continue;
        };
        let level = ctx.granularity.level_of(window, &scope);
        if let Some(key) = reduce(widget, &rctx, level) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    let flags = StateFlags {
        orientation: observation.orientation,
        keyboard_open: observation.keyboard_open,
        dialog_open: infer_window_kind(observation).is_overlay(),
        ..StateFlags::default()
    };
    let signature = StateSignature {
        window,
        keys: counts.keys().cloned().collect(),
        flags,
    };
    (signature, counts)
}
