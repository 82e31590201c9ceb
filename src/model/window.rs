use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::error::{ModelError, Result};
use crate::model::ids::{ElementId, InputId, WindowId};

/// Closed set of logical surface kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindowKind {
    Activity,
    Dialog,
    OptionsMenu,
    ContextMenu,
    Launcher,
    OutOfScope,
    Placeholder,
}

impl WindowKind {
    /// Surfaces drawn over another window.
    pub fn is_overlay(&self) -> bool {
        matches!(
            self,
            WindowKind::Dialog | WindowKind::OptionsMenu | WindowKind::ContextMenu
        )
    }

    /// Containers that can be folded into their owning window.
    pub fn is_foldable(&self) -> bool {
        matches!(self, WindowKind::OptionsMenu)
    }

    /// Windows that belong to the app under exploration.
    pub fn is_app_window(&self) -> bool {
        match self {
            WindowKind::Activity
            | WindowKind::Dialog
            | WindowKind::OptionsMenu
            | WindowKind::ContextMenu => true,
            WindowKind::Launcher | WindowKind::OutOfScope | WindowKind::Placeholder => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Window {
    pub id: WindowId,
    pub kind: WindowKind,
    pub class_name: String,
    pub owner: Option<WindowId>,
    pub elements: BTreeSet<ElementId>,
    pub inputs: BTreeSet<InputId>,
    /// Created from a runtime observation with no static counterpart.
    pub runtime_created: bool,
    /// Set once this window has been folded into another one.
    pub retired_into: Option<WindowId>,
}

impl Window {
    pub fn is_retired(&self) -> bool {
        self.retired_into.is_some()
    }
}

/// Registry of windows, one per distinct (kind, class) pair. Windows are
/// never removed; folding only retires them.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: BTreeMap<WindowId, Window>,
    by_identity: HashMap<(WindowKind, String), WindowId>,
    next_id: u32,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, kind: WindowKind, class_name: &str) -> Option<WindowId> {
        self.by_identity
            .get(&(kind, class_name.to_string()))
            .copied()
    }

    /// Look up a window by class name regardless of kind.
    pub fn find_by_class(&self, class_name: &str) -> Option<WindowId> {
        self.windows
            .values()
            .find(|w| w.class_name == class_name)
            .map(|w| w.id)
    }

    /// Returns the id and whether the window was created by this call.
    pub fn get_or_create(
        &mut self,
        kind: WindowKind,
        class_name: &str,
        runtime_created: bool,
    ) -> (WindowId, bool) {
        if let Some(id) = self.find(kind, class_name) {
            return (id, false);
        }

        let id = WindowId(self.next_id);
        self.next_id += 1;
        self.windows.insert(
            id,
            Window {
                id,
                kind,
                class_name: class_name.to_string(),
                owner: None,
                elements: BTreeSet::new(),
                inputs: BTreeSet::new(),
                runtime_created,
                retired_into: None,
            },
        );
        self.by_identity.insert((kind, class_name.to_string()), id);
        (id, true)
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Result<&mut Window> {
        self.windows.get_mut(&id).ok_or(ModelError::UnknownWindow(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Window> {
        self.windows.values()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn set_owner(&mut self, id: WindowId, owner: WindowId) -> Result<()> {
        self.get_mut(id)?.owner = Some(owner);
        Ok(())
    }

    /// Follow the fold chain to the window currently standing in for `id`.
    pub fn active(&self, id: WindowId) -> WindowId {
        let mut current = id;
        // Bounded by registry size to stay safe against accidental cycles.
        for _ in 0..=self.windows.len() {
            match self.windows.get(&current).and_then(|w| w.retired_into) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    pub fn is_active(&self, id: WindowId) -> bool {
        self.windows
            .get(&id)
            .is_some_and(|w| w.retired_into.is_none())
    }

    pub fn retire(&mut self, id: WindowId, into: WindowId) -> Result<()> {
        if !self.windows.contains_key(&into) {
            return Err(ModelError::UnknownWindow(into));
        }
        self.get_mut(id)?.retired_into = Some(into);
        Ok(())
    }

    /// Active windows of the given kind owned by `owner`.
    pub fn owned_by(&self, owner: WindowId, kind: WindowKind) -> Vec<WindowId> {
        self.windows
            .values()
            .filter(|w| w.owner == Some(owner) && w.kind == kind && w.retired_into.is_none())
            .map(|w| w.id)
            .collect()
    }

    pub fn label(&self, id: WindowId) -> String {
        self.windows
            .get(&id)
            .map(|w| format!("{:?}:{}", w.kind, w.class_name))
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_keyed_by_kind_and_class() {
        let mut reg = WindowRegistry::new();
        let (a, created) = reg.get_or_create(WindowKind::Activity, "Main", false);
        assert!(created);
        let (b, created) = reg.get_or_create(WindowKind::Activity, "Main", true);
        assert!(!created);
        assert_eq!(a, b);
        let (c, _) = reg.get_or_create(WindowKind::Dialog, "Main", false);
        assert_ne!(a, c, "kind is part of window identity");
    }

    #[test]
    fn retired_windows_resolve_to_their_owner() {
        let mut reg = WindowRegistry::new();
        let (activity, _) = reg.get_or_create(WindowKind::Activity, "Main", false);
        let (menu, _) = reg.get_or_create(WindowKind::OptionsMenu, "Main$Menu", false);
        reg.retire(menu, activity).unwrap();
        assert_eq!(reg.active(menu), activity);
        assert!(!reg.is_active(menu));
        assert!(reg.get(menu).is_some(), "retired windows are kept");
    }
}
