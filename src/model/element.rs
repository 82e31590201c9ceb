use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::model::error::{ModelError, Result};
use crate::model::ids::{ElementId, WindowId};

/// Static widget descriptor owned by one window.
#[derive(Debug, Clone, Serialize)]
pub struct Element {
    pub id: ElementId,
    pub window: WindowId,
    /// Structural signature: ancestor class path, class and resource id.
    pub signature: String,
    pub class_name: String,
    pub resource_id: Option<String>,
    pub parent: Option<ElementId>,
    pub children: BTreeSet<ElementId>,
    /// Text values seen on (or declared for) this element.
    pub texts: BTreeSet<String>,
    pub runtime_created: bool,
}

pub struct NewElement<'a> {
    pub window: WindowId,
    pub signature: &'a str,
    pub class_name: &'a str,
    pub resource_id: Option<&'a str>,
    pub parent: Option<ElementId>,
    pub runtime_created: bool,
}

/// Element registry. Structurally identical elements (same window and
/// signature) are stored once.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    elements: BTreeMap<ElementId, Element>,
    by_signature: HashMap<(WindowId, String), ElementId>,
    next_id: u32,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn find(&self, window: WindowId, signature: &str) -> Option<ElementId> {
        self.by_signature
            .get(&(window, signature.to_string()))
            .copied()
    }

    /// Match a runtime widget to a known element: exact structural signature
    /// first, then class plus resource id.
    pub fn match_widget(
        &self,
        window: WindowId,
        signature: &str,
        class_name: &str,
        resource_id: Option<&str>,
    ) -> Option<ElementId> {
        if let Some(id) = self.find(window, signature) {
            return Some(id);
        }
        let resource_id = resource_id?;
        self.elements
            .values()
            .find(|e| {
                e.window == window
                    && e.class_name == class_name
                    && e.resource_id.as_deref() == Some(resource_id)
            })
            .map(|e| e.id)
    }

    /// Get or create; returns the id and whether it was created.
    pub fn insert(&mut self, new: NewElement<'_>) -> (ElementId, bool) {
        if let Some(id) = self.find(new.window, new.signature) {
            return (id, false);
        }

        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.elements.insert(
            id,
            Element {
                id,
                window: new.window,
                signature: new.signature.to_string(),
                class_name: new.class_name.to_string(),
                resource_id: new.resource_id.map(str::to_string),
                parent: new.parent,
                children: BTreeSet::new(),
                texts: BTreeSet::new(),
                runtime_created: new.runtime_created,
            },
        );
        self.by_signature
            .insert((new.window, new.signature.to_string()), id);
        if let Some(parent) = new.parent.and_then(|p| self.elements.get_mut(&p)) {
            parent.children.insert(id);
        }
        (id, true)
    }

    pub fn set_parent(&mut self, id: ElementId, parent: ElementId) -> Result<()> {
        if !self.elements.contains_key(&parent) {
            return Err(ModelError::UnknownElement(parent));
        }
        let element = self
            .elements
            .get_mut(&id)
            .ok_or(ModelError::UnknownElement(id))?;
        element.parent = Some(parent);
        if let Some(p) = self.elements.get_mut(&parent) {
            p.children.insert(id);
        }
        Ok(())
    }

    pub fn add_text(&mut self, id: ElementId, text: &str) {
        if let Some(element) = self.elements.get_mut(&id) {
            element.texts.insert(text.to_string());
        }
    }

    /// Move an element to another window. When the target window already has a
    /// structurally identical element the two are deduplicated and the
    /// surviving id is returned.
    pub fn reparent(&mut self, id: ElementId, window: WindowId) -> Result<ElementId> {
        let element = self
            .elements
            .get(&id)
            .ok_or(ModelError::UnknownElement(id))?
            .clone();

        if element.window == window {
            return Ok(id);
        }

        self.by_signature
            .remove(&(element.window, element.signature.clone()));

        if let Some(existing) = self.find(window, &element.signature) {
            self.elements.remove(&id);
            for child in &element.children {
                if let Some(c) = self.elements.get_mut(child) {
                    c.parent = Some(existing);
                }
            }
            if let Some(parent) = element.parent.and_then(|p| self.elements.get_mut(&p)) {
                parent.children.remove(&id);
                parent.children.insert(existing);
            }
            if let Some(kept) = self.elements.get_mut(&existing) {
                kept.texts.extend(element.texts);
                kept.children.extend(element.children);
            }
            return Ok(existing);
        }

        if let Some(moved) = self.elements.get_mut(&id) {
            moved.window = window;
        }
        self.by_signature.insert((window, element.signature), id);
        Ok(id)
    }
}
