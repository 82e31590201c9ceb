use thiserror::Error;

use crate::model::ids::{ElementId, InputId, StateId, WindowId};
use crate::observation::observation_model::ActionKind;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Violations of registry invariants. `DuplicateInput` is a programming
/// error: Input identity uniqueness underpins evidence accumulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("duplicate input {event:?} on {element} in window {window}")]
    DuplicateInput {
        event: ActionKind,
        element: String,
        window: WindowId,
    },

    #[error("unknown window: {0}")]
    UnknownWindow(WindowId),

    #[error("unknown element: {0}")]
    UnknownElement(ElementId),

    #[error("unknown input: {0}")]
    UnknownInput(InputId),

    #[error("unknown abstract state: {0}")]
    UnknownState(StateId),

    #[error("observation {0} is not in the log")]
    UnknownObservation(String),

    #[error("empty state hash prefix")]
    EmptyHashPrefix,

    #[error("no abstract state hash starts with '{0}'")]
    UnknownHash(String),

    #[error("state hash prefix '{prefix}' matches {matches} states")]
    AmbiguousHash { prefix: String, matches: usize },
}
