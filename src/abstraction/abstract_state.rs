use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::abstraction::reducer::{AbstractionKey, Attribute};
use crate::model::ids::{InputId, ObservationId, StateId, WindowId};
use crate::observation::normalize::text_fingerprint;
use crate::observation::observation_model::{ActionKind, Orientation};

/// Contextual dimensions that take part in state identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct StateFlags {
    pub orientation: Orientation,
    pub keyboard_open: bool,
    pub dialog_open: bool,
    pub out_of_scope: bool,
    pub home: bool,
    pub app_stopped: bool,
}

impl StateFlags {
    pub fn is_special(&self) -> bool {
        self.out_of_scope || self.home || self.app_stopped
    }
}

/// Identity tuple of an abstract state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateSignature {
    pub window: WindowId,
    pub keys: BTreeSet<AbstractionKey>,
    pub flags: StateFlags,
}

impl StateSignature {
    /// Stable hash: uses the window class rather than the run-local id.
    pub fn hash_with(&self, window_class: &str) -> String {
        let mut canonical = format!("{}|{:?}", window_class, self.flags);
        for key in &self.keys {
            canonical.push('|');
            for (attr, value) in key.attributes() {
                canonical.push_str(&format!("{:?}={};", attr, value));
            }
        }
        text_fingerprint(&canonical)
    }
}

/// An action available from a state: kind, optional target class, payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AbstractAction {
    pub kind: ActionKind,
    pub target: Option<AbstractionKey>,
    pub payload: Option<String>,
}

impl AbstractAction {
    pub fn window_level(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            payload: None,
        }
    }

    pub fn on(kind: ActionKind, target: AbstractionKey) -> Self {
        Self {
            kind,
            target: Some(target),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Option<String>) -> Self {
        self.payload = if self.kind.keeps_payload() { payload } else { None };
        self
    }

    pub fn is_reset(&self) -> bool {
        self.kind.is_reset()
    }

    /// Any action on the same structural element, regardless of kind.
    pub fn targets_same_element(&self, other: &AbstractAction) -> bool {
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => a.same_element(b),
            _ => false,
        }
    }
}

impl fmt::Display for AbstractAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(target) = &self.target {
            write!(f, "({})", target)?;
        }
        if let Some(payload) = &self.payload {
            write!(f, ":{}", payload)?;
        }
        Ok(())
    }
}

/// A node of the abstract graph: one class of equivalent concrete screens.
#[derive(Debug, Clone, Serialize)]
pub struct AbstractState {
    pub id: StateId,
    pub window: WindowId,
    /// Retained keys with their occurrence count in the first observation.
    pub keys: BTreeMap<AbstractionKey, u32>,
    pub flags: StateFlags,
    pub hash: String,
    pub observations: BTreeSet<ObservationId>,
    pub actions: BTreeSet<AbstractAction>,
    pub input_mapping: BTreeMap<AbstractAction, BTreeSet<InputId>>,
    /// Restored from a persisted model rather than observed in this run.
    pub loaded: bool,
}

impl AbstractState {
    pub fn signature(&self) -> StateSignature {
        StateSignature {
            window: self.window,
            keys: self.keys.keys().cloned().collect(),
            flags: self.flags,
        }
    }

    pub fn contains_key(&self, key: &AbstractionKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn has_action(&self, action: &AbstractAction) -> bool {
        self.actions.contains(action) || self.input_mapping.contains_key(action)
    }

    /// First key with the given class and resource id.
    pub fn key_matching(&self, class_name: &str, resource_id: Option<&str>) -> Option<&AbstractionKey> {
        self.keys.keys().find(|k| {
            k.get(Attribute::ClassName) == Some(class_name) && k.get(Attribute::ResourceId) == resource_id
        })
    }
}

/// Actions a state offers, derived from key capabilities and flags.
pub fn derive_actions(keys: &BTreeMap<AbstractionKey, u32>, flags: &StateFlags) -> BTreeSet<AbstractAction> {
    let mut actions = BTreeSet::new();

    if flags.home || flags.app_stopped {
        actions.insert(AbstractAction::window_level(ActionKind::Launch));
        return actions;
    }

    actions.insert(AbstractAction::window_level(ActionKind::PressBack));
    actions.insert(AbstractAction::window_level(ActionKind::Reset));
    if flags.out_of_scope {
        return actions;
    }

    actions.insert(AbstractAction::window_level(ActionKind::PressMenu));
    actions.insert(AbstractAction::window_level(ActionKind::Rotate));
    if flags.keyboard_open {
        actions.insert(AbstractAction::window_level(ActionKind::CloseKeyboard));
    }

    for key in keys.keys() {
        if key.capability(Attribute::Clickable) || key.capability(Attribute::Checkable) {
            actions.insert(AbstractAction::on(ActionKind::Click, key.clone()));
        }
        if key.capability(Attribute::LongClickable) {
            actions.insert(AbstractAction::on(ActionKind::LongClick, key.clone()));
        }
        if key.capability(Attribute::Scrollable) {
            actions.insert(AbstractAction::on(ActionKind::Swipe, key.clone()));
        }
        if key.capability(Attribute::Editable) {
            actions.insert(AbstractAction::on(ActionKind::TextInput, key.clone()));
        }
    }

    actions
}
