use log::debug;

use crate::abstraction::abstract_state::AbstractAction;
use crate::abstraction::reducer::{reduce, ReducerContext};
use crate::graph::transition_model::{RecordOutcome, TransitionRecord};
use crate::model::context::ModelContext;
use crate::model::element::NewElement;
use crate::model::error::{ModelError, Result};
use crate::model::history::InteractionRecord;
use crate::model::ids::{InputId, WindowId};
use crate::observation::observation_model::{ConcreteObservation, Interaction};
use crate::trace::trace::EngineEvent;

/// Derive and record the abstract transition of a logged interaction from
/// the current state boundaries. `None` when either endpoint has no state.
pub fn derive_transition(
    ctx: &mut ModelContext,
    record: &InteractionRecord,
    replay: bool,
) -> Result<Option<RecordOutcome>> {
    let (Some(source), Some(destination)) = (
        ctx.states.state_of(record.source),
        ctx.states.state_of(record.destination),
    ) else {
        return Ok(None);
    };

    let observation = ctx
        .history
        .observation(record.source)
        .cloned()
        .ok_or_else(|| ModelError::UnknownObservation(record.source.to_string()))?;
    let window = ctx
        .states
        .get(source)
        .map(|s| ctx.windows.active(s.window))
        .ok_or(ModelError::UnknownState(source))?;

    let (action, input) = abstract_action_for(ctx, window, &observation, &record.interaction)?;

    {
        let state = ctx.states.get_mut(source)?;
        state.actions.insert(action.clone());
        if let Some(input) = input {
            state
                .input_mapping
                .entry(action.clone())
                .or_default()
                .insert(input);
        }
    }

    let dependent_state = record.predecessor.and_then(|p| ctx.states.state_of(p));
    let prior_window = record.prior_window.map(|w| ctx.windows.active(w));
    let label = action.to_string();

    let outcome = ctx.graph.record_transition(
        &mut ctx.inputs,
        TransitionRecord {
            source,
            action,
            destination,
            prior_window,
            interaction: Some(record.id),
            input,
            coverage: record.coverage.clone(),
            new_coverage: record.new_coverage,
            dependent_state,
            replay,
        },
    )?;

    debug!("{} {} --{}--> {} ({})", outcome.label(), source, label, destination, record.id);
    ctx.emit(EngineEvent::TransitionRecorded {
        transition: outcome.transition(),
        source,
        destination,
        action: label,
        outcome: outcome.label(),
        replay,
    });
    Ok(Some(outcome))
}

/// Abstract action and Input of a concrete interaction performed in
/// `window`. Targets are reduced at their current granularity; unknown
/// targets fall back to a window-level action.
pub fn abstract_action_for(
    ctx: &mut ModelContext,
    window: WindowId,
    observation: &ConcreteObservation,
    interaction: &Interaction,
) -> Result<(AbstractAction, Option<InputId>)> {
    let kind = interaction.kind;
    let rctx = ReducerContext::new(window, observation);

    let target = interaction
        .target
        .filter(|_| kind.targets_widget())
        .and_then(|index| rctx.widget(index))
        .and_then(|widget| {
            let signature = rctx.structural_signature(widget)?;
            let level = ctx.granularity.level_of(window, &signature);
            reduce(widget, &rctx, level).map(|key| (widget, signature, key))
        });

    let (action, element) = match target {
        Some((widget, signature, key)) => {
            let element = match ctx.elements.match_widget(
                window,
                &signature,
                &widget.class_name,
                widget.resource_id.as_deref(),
            ) {
                Some(id) => id,
                None => {
                    ctx.elements
                        .insert(NewElement {
                            window,
                            signature: &signature,
                            class_name: &widget.class_name,
                            resource_id: widget.resource_id.as_deref(),
                            parent: None,
                            runtime_created: true,
                        })
                        .0
                }
            };
            ctx.windows.get_mut(window)?.elements.insert(element);
            (AbstractAction::on(kind, key), Some(element))
        }
        None => (AbstractAction::window_level(kind), None),
    };

    let (input, _) = ctx.inputs.get_or_create(kind, element, window);
    ctx.windows.get_mut(window)?.inputs.insert(input);

    Ok((action.with_payload(interaction.payload.clone()), Some(input)))
}
