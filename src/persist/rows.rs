use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::abstraction::abstract_state::{AbstractAction, StateFlags};
use crate::abstraction::reducer::{Attribute, GranularityLevel};
use crate::model::ids::{ElementId, InputId, StateId, TransitionId, WindowId};
use crate::model::window::WindowKind;
use crate::observation::observation_model::ActionKind;

pub const WINDOWS: &str = "windows";
pub const ELEMENTS: &str = "elements";
pub const INPUTS: &str = "inputs";
pub const STATES: &str = "states";
pub const TRANSITIONS: &str = "transitions";
pub const GRANULARITY: &str = "granularity";

pub fn table_file(table: &str) -> String {
    format!("{}.jsonl", table)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRow {
    pub id: WindowId,
    pub kind: WindowKind,
    pub class_name: String,
    #[serde(default)]
    pub owner: Option<WindowId>,
    #[serde(default)]
    pub retired_into: Option<WindowId>,
    #[serde(default)]
    pub runtime_created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRow {
    pub id: ElementId,
    pub window: WindowId,
    pub signature: String,
    pub class_name: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub parent: Option<ElementId>,
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub runtime_created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRow {
    pub id: InputId,
    pub event: ActionKind,
    #[serde(default)]
    pub element: Option<ElementId>,
    pub window: WindowId,
    #[serde(default)]
    pub handlers: BTreeSet<String>,
    #[serde(default)]
    pub verified_handlers: BTreeSet<String>,
    #[serde(default)]
    pub covered_code: BTreeSet<String>,
    #[serde(default)]
    pub exercised: u32,
    #[serde(default)]
    pub runtime_created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRow {
    pub attributes: Vec<(Attribute, String)>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
    pub action: AbstractAction,
    pub inputs: Vec<InputId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRow {
    pub id: StateId,
    pub window: WindowId,
    pub hash: String,
    pub flags: StateFlags,
    pub keys: Vec<KeyRow>,
    #[serde(default)]
    pub actions: Vec<AbstractAction>,
    #[serde(default)]
    pub input_mapping: Vec<MappingRow>,
    /// Observations attached when dumped (informational).
    #[serde(default)]
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRow {
    pub id: TransitionId,
    pub source: StateId,
    pub destination: StateId,
    pub action: AbstractAction,
    #[serde(default)]
    pub prior_window: Option<WindowId>,
    pub implicit: bool,
    #[serde(default)]
    pub guarded: bool,
    #[serde(default)]
    pub handlers: BTreeSet<String>,
    #[serde(default)]
    pub covered_code: BTreeSet<String>,
    #[serde(default)]
    pub new_coverage: bool,
    #[serde(default)]
    pub dependent_states: Vec<StateId>,
    #[serde(default)]
    pub inputs: Vec<InputId>,
    /// Concrete traversals when dumped (informational).
    #[serde(default)]
    pub interactions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranularityRow {
    pub window: WindowId,
    pub signature: String,
    pub level: GranularityLevel,
}
