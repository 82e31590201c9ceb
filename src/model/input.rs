use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::model::error::{ModelError, Result};
use crate::model::ids::{ElementId, InputId, WindowId};
use crate::observation::observation_model::ActionKind;

/// A declared interaction: (event kind, optional element, window).
#[derive(Debug, Clone, Serialize)]
pub struct Input {
    pub id: InputId,
    pub event: ActionKind,
    pub element: Option<ElementId>,
    pub window: WindowId,

    /// Handlers declared by static analysis.
    pub handlers: BTreeSet<String>,
    /// Declared handlers confirmed by the coverage feed.
    pub verified_handlers: BTreeSet<String>,
    /// Every code element seen while exercising this input.
    pub covered_code: BTreeSet<String>,
    pub exercised: u32,
    pub runtime_created: bool,
}

impl Input {
    /// Declared handlers not yet confirmed by coverage.
    pub fn uncovered_handlers(&self) -> BTreeSet<String> {
        self.handlers
            .difference(&self.verified_handlers)
            .cloned()
            .collect()
    }
}

type InputIdentity = (ActionKind, Option<ElementId>, WindowId);

/// Globally deduplicated input registry.
#[derive(Debug, Default)]
pub struct InputRegistry {
    inputs: BTreeMap<InputId, Input>,
    by_identity: HashMap<InputIdentity, InputId>,
    next_id: u32,
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: InputId) -> Option<&Input> {
        self.inputs.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Input> {
        self.inputs.values()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn find(
        &self,
        event: ActionKind,
        element: Option<ElementId>,
        window: WindowId,
    ) -> Option<InputId> {
        self.by_identity.get(&(event, element, window)).copied()
    }

    /// Create a new input. An existing input with the same identity is an
    /// invariant violation.
    pub fn create(
        &mut self,
        event: ActionKind,
        element: Option<ElementId>,
        window: WindowId,
        handlers: BTreeSet<String>,
        runtime_created: bool,
    ) -> Result<InputId> {
        if self.find(event, element, window).is_some() {
            return Err(ModelError::DuplicateInput {
                event,
                element: element.map_or_else(|| "<window>".to_string(), |e| e.to_string()),
                window,
            });
        }

        let id = InputId(self.next_id);
        self.next_id += 1;
        self.inputs.insert(
            id,
            Input {
                id,
                event,
                element,
                window,
                handlers,
                verified_handlers: BTreeSet::new(),
                covered_code: BTreeSet::new(),
                exercised: 0,
                runtime_created,
            },
        );
        self.by_identity.insert((event, element, window), id);
        Ok(id)
    }

    /// Existing input for the identity, or a runtime-created one.
    pub fn get_or_create(
        &mut self,
        event: ActionKind,
        element: Option<ElementId>,
        window: WindowId,
    ) -> (InputId, bool) {
        if let Some(id) = self.find(event, element, window) {
            return (id, false);
        }
        let id = InputId(self.next_id);
        self.next_id += 1;
        self.inputs.insert(
            id,
            Input {
                id,
                event,
                element,
                window,
                handlers: BTreeSet::new(),
                verified_handlers: BTreeSet::new(),
                covered_code: BTreeSet::new(),
                exercised: 0,
                runtime_created: true,
            },
        );
        self.by_identity.insert((event, element, window), id);
        (id, true)
    }

    /// Fold coverage evidence into an input. Sets only grow. Returns the
    /// declared handlers confirmed by this feed.
    pub(crate) fn absorb_coverage(
        &mut self,
        id: InputId,
        coverage: &BTreeSet<String>,
        count_exercise: bool,
    ) -> Result<BTreeSet<String>> {
        let input = self
            .inputs
            .get_mut(&id)
            .ok_or(ModelError::UnknownInput(id))?;

        let verified: BTreeSet<String> = input.handlers.intersection(coverage).cloned().collect();
        input.verified_handlers.extend(verified.iter().cloned());
        input.covered_code.extend(coverage.iter().cloned());
        if count_exercise {
            input.exercised += 1;
        }
        Ok(verified)
    }

    /// Restore persisted evidence (union semantics).
    pub(crate) fn restore_evidence(
        &mut self,
        id: InputId,
        handlers: &BTreeSet<String>,
        verified: &BTreeSet<String>,
        covered: &BTreeSet<String>,
        exercised: u32,
    ) -> Result<()> {
        let input = self
            .inputs
            .get_mut(&id)
            .ok_or(ModelError::UnknownInput(id))?;
        input.handlers.extend(handlers.iter().cloned());
        input.verified_handlers.extend(verified.iter().cloned());
        input.covered_code.extend(covered.iter().cloned());
        input.exercised = input.exercised.max(exercised);
        Ok(())
    }

    /// Re-point an input to another window/element. If an input with the new
    /// identity exists, evidence is merged into it and the old input is
    /// removed. Returns the surviving id.
    pub(crate) fn repoint(
        &mut self,
        id: InputId,
        window: WindowId,
        element: Option<ElementId>,
    ) -> Result<InputId> {
        let old = self
            .inputs
            .get(&id)
            .ok_or(ModelError::UnknownInput(id))?
            .clone();

        if old.window == window && old.element == element {
            return Ok(id);
        }

        self.by_identity.remove(&(old.event, old.element, old.window));

        if let Some(existing) = self.find(old.event, element, window) {
            self.inputs.remove(&id);
            if let Some(kept) = self.inputs.get_mut(&existing) {
                kept.handlers.extend(old.handlers);
                kept.verified_handlers.extend(old.verified_handlers);
                kept.covered_code.extend(old.covered_code);
                kept.exercised += old.exercised;
            }
            return Ok(existing);
        }

        if let Some(moved) = self.inputs.get_mut(&id) {
            moved.window = window;
            moved.element = element;
        }
        self.by_identity.insert((old.event, element, window), id);
        Ok(id)
    }
}
