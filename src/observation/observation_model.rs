use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::window::WindowKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Kind of interaction performed on a screen, or declared on a window by the
/// static reference artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    Click,
    LongClick,
    TextInput,
    Swipe,
    Scroll,
    PressBack,
    PressMenu,
    PressHome,
    Rotate,
    CloseKeyboard,
    Reset,
    Launch,
}

impl ActionKind {
    /// Reset and launch restart the application from its entry screen.
    pub fn is_reset(&self) -> bool {
        matches!(self, ActionKind::Reset | ActionKind::Launch)
    }

    /// Actions that need a target widget to be meaningful.
    pub fn targets_widget(&self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::LongClick
                | ActionKind::TextInput
                | ActionKind::Swipe
                | ActionKind::Scroll
        )
    }

    /// Payloads that survive abstraction (swipe/scroll direction). Text values
    /// are synthesized per run and never part of the abstract action.
    pub fn keeps_payload(&self) -> bool {
        matches!(self, ActionKind::Swipe | ActionKind::Scroll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// One widget of a flattened concrete tree, as reported by the exploration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcreteWidget {
    pub index: u32,
    pub parent: Option<u32>,
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "resourceId")]
    pub resource_id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "contentDesc")]
    pub content_desc: Option<String>,

    pub visible: bool,
    pub enabled: bool,
    pub clickable: bool,
    #[serde(rename = "longClickable")]
    pub long_clickable: bool,
    pub checkable: bool,
    pub checked: bool,
    pub selected: bool,
    pub scrollable: bool,
    pub editable: bool,
    pub focused: bool,

    pub bounds: Option<Bounds>,
}

impl Default for ConcreteWidget {
    fn default() -> Self {
        Self {
            index: 0,
            parent: None,
            class_name: String::new(),
            resource_id: None,
            text: None,
            content_desc: None,
            visible: true,
            enabled: true,
            clickable: false,
            long_clickable: false,
            checkable: false,
            checked: false,
            selected: false,
            scrollable: false,
            editable: false,
            focused: false,
            bounds: None,
        }
    }
}

impl ConcreteWidget {
    pub fn is_interactive(&self) -> bool {
        self.clickable || self.long_clickable || self.checkable || self.scrollable || self.editable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenFlags {
    #[serde(rename = "isHomeScreen")]
    pub is_home_screen: bool,
    #[serde(rename = "isAppStopped")]
    pub is_app_stopped: bool,
    #[serde(rename = "isCrashDialog")]
    pub is_crash_dialog: bool,
}

/// A concrete screen snapshot: window signature, flattened widget tree, and
/// contextual dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConcreteObservation {
    /// Class identity of the logical window (activity or dialog class).
    pub window: String,
    #[serde(rename = "windowKind")]
    pub window_kind: Option<WindowKind>,
    /// Owning window class for dialogs and menus.
    #[serde(rename = "ownerWindow")]
    pub owner_window: Option<String>,
    pub package: String,
    pub orientation: Orientation,
    #[serde(rename = "keyboardOpen")]
    pub keyboard_open: bool,
    pub flags: ScreenFlags,
    pub widgets: Vec<ConcreteWidget>,
}

impl ConcreteObservation {
    pub fn widget(&self, index: u32) -> Option<&ConcreteWidget> {
        self.widgets.iter().find(|w| w.index == index)
    }

    /// Index widgets by their tree index for repeated parent/child lookups.
    pub fn index_widgets(&self) -> HashMap<u32, &ConcreteWidget> {
        self.widgets.iter().map(|w| (w.index, w)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: ActionKind,
    /// Tree index of the acted-on widget in the source observation.
    #[serde(default)]
    pub target: Option<u32>,
    #[serde(default)]
    pub payload: Option<String>,
}

impl Interaction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            payload: None,
        }
    }

    pub fn on(kind: ActionKind, target: u32) -> Self {
        Self {
            kind,
            target: Some(target),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// One unit of input to the engine: the interaction just performed (absent for
/// the first snapshot), the resulting screen, and the coverage feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedStep {
    #[serde(default)]
    pub interaction: Option<Interaction>,
    pub observation: ConcreteObservation,
    #[serde(default)]
    pub coverage: BTreeSet<String>,
}

impl ObservedStep {
    pub fn initial(observation: ConcreteObservation) -> Self {
        Self {
            interaction: None,
            observation,
            coverage: BTreeSet::new(),
        }
    }

    pub fn after(interaction: Interaction, observation: ConcreteObservation) -> Self {
        Self {
            interaction: Some(interaction),
            observation,
            coverage: BTreeSet::new(),
        }
    }

    pub fn with_coverage<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coverage.extend(ids.into_iter().map(Into::into));
        self
    }
}
