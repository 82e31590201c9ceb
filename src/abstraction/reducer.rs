use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ids::WindowId;
use crate::observation::normalize::{normalize_text, simple_class_name};
use crate::observation::observation_model::{ConcreteObservation, ConcreteWidget};

// ============================================================================
// Attributes and granularity levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    ClassName,
    ResourceId,
    AncestorPath,
    Clickable,
    LongClickable,
    Checkable,
    Scrollable,
    Editable,
    Enabled,
    Checked,
    Selected,
    Text,
    ContentDesc,
    SiblingIndex,
    ChildCount,
}

/// Granularity of the equivalence function. Each level adds attributes to
/// the previous one and never removes any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum GranularityLevel {
    /// Class, resource id, ancestor path, interactive capabilities.
    #[default]
    Structure,
    /// + enabled, checked, selected.
    State,
    /// + normalized text and content description.
    Content,
    /// + sibling index and child count.
    Position,
}

impl GranularityLevel {
    pub const MAX: GranularityLevel = GranularityLevel::Position;

    pub fn next(self) -> Option<GranularityLevel> {
        match self {
            GranularityLevel::Structure => Some(GranularityLevel::State),
            GranularityLevel::State => Some(GranularityLevel::Content),
            GranularityLevel::Content => Some(GranularityLevel::Position),
            GranularityLevel::Position => None,
        }
    }

    pub fn includes(self, level: GranularityLevel) -> bool {
        self >= level
    }
}

// ============================================================================
// AbstractionKey
// ============================================================================

/// Ordered attribute->value record identifying an element equivalence class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct AbstractionKey(Vec<(Attribute, String)>);

impl AbstractionKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Attribute, String)>,
    {
        let mut key = Self::new();
        for (attr, value) in pairs {
            key.set(attr, value);
        }
        key
    }

    pub fn set(&mut self, attr: Attribute, value: impl Into<String>) {
        let value = value.into();
        match self.0.binary_search_by_key(&attr, |(a, _)| *a) {
            Ok(pos) => self.0[pos].1 = value,
            Err(pos) => self.0.insert(pos, (attr, value)),
        }
    }

    pub fn get(&self, attr: Attribute) -> Option<&str> {
        self.0
            .binary_search_by_key(&attr, |(a, _)| *a)
            .ok()
            .map(|pos| self.0[pos].1.as_str())
    }

    pub fn has(&self, attr: Attribute) -> bool {
        self.get(attr).is_some()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &(Attribute, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every attribute of `self` appears with the same value in `finer`.
    pub fn is_coarsening_of(&self, finer: &AbstractionKey) -> bool {
        self.0.iter().all(|(a, v)| finer.get(*a) == Some(v.as_str()))
    }

    /// Same structural element: class, resource id and ancestor path agree.
    pub fn same_element(&self, other: &AbstractionKey) -> bool {
        [Attribute::ClassName, Attribute::ResourceId, Attribute::AncestorPath]
            .iter()
            .all(|a| self.get(*a) == other.get(*a))
    }

    pub fn capability(&self, attr: Attribute) -> bool {
        self.get(attr) == Some("true")
    }
}

impl fmt::Display for AbstractionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = self.get(Attribute::ClassName).unwrap_or("?");
        write!(f, "{}", simple_class_name(class))?;
        if let Some(res) = self.get(Attribute::ResourceId) {
            write!(f, "#{}", res)?;
        }
        let extra: Vec<String> = self
            .0
            .iter()
            .filter(|(a, _)| {
                !matches!(
                    a,
                    Attribute::ClassName | Attribute::ResourceId | Attribute::AncestorPath
                )
            })
            .map(|(a, v)| format!("{:?}={}", a, v))
            .collect();
        if !extra.is_empty() {
            write!(f, "[{}]", extra.join(","))?;
        }
        Ok(())
    }
}

// ============================================================================
// Reducer context
// ============================================================================

/// Tree indices of one observation, shared by every reduction on it.
pub struct ReducerContext<'a> {
    pub window: WindowId,
    observation: &'a ConcreteObservation,
    by_index: HashMap<u32, &'a ConcreteWidget>,
    children: HashMap<u32, Vec<u32>>,
}

impl<'a> ReducerContext<'a> {
    pub fn new(window: WindowId, observation: &'a ConcreteObservation) -> Self {
        let by_index = observation.index_widgets();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for w in &observation.widgets {
            if let Some(parent) = w.parent {
                children.entry(parent).or_default().push(w.index);
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }
        Self {
            window,
            observation,
            by_index,
            children,
        }
    }

    pub fn observation(&self) -> &'a ConcreteObservation {
        self.observation
    }

    pub fn widget(&self, index: u32) -> Option<&'a ConcreteWidget> {
        self.by_index.get(&index).copied()
    }

    /// Ancestors from the root down to the direct parent.
    pub fn ancestors(&self, widget: &ConcreteWidget) -> Vec<&'a ConcreteWidget> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = widget.parent;
        while let Some(index) = current {
            if !seen.insert(index) {
                break;
            }
            match self.widget(index) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent.parent;
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    pub fn sibling_index(&self, widget: &ConcreteWidget) -> usize {
        widget
            .parent
            .and_then(|p| self.children.get(&p))
            .and_then(|siblings| siblings.iter().position(|i| *i == widget.index))
            .unwrap_or(0)
    }

    pub fn child_count(&self, widget: &ConcreteWidget) -> usize {
        self.children.get(&widget.index).map_or(0, Vec::len)
    }

    pub fn ancestor_path(&self, widget: &ConcreteWidget) -> String {
        self.ancestors(widget)
            .iter()
            .map(|w| simple_class_name(&w.class_name))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Scope signature under which granularity levels are tracked.
    pub fn structural_signature(&self, widget: &ConcreteWidget) -> Option<String> {
        if widget.class_name.trim().is_empty() {
            return None;
        }
        Some(structural_signature(
            &self.ancestor_path(widget),
            &widget.class_name,
            widget.resource_id.as_deref(),
        ))
    }
}

pub fn structural_signature(ancestor_path: &str, class_name: &str, resource_id: Option<&str>) -> String {
    format!(
        "{}/{}#{}",
        ancestor_path,
        simple_class_name(class_name),
        resource_id.unwrap_or("")
    )
}

// ============================================================================
// Reduction
// ============================================================================

/// Widgets that contribute to a state's identity: visible, classified, and
/// either interactive or carrying an id or text.
pub fn is_retained(widget: &ConcreteWidget) -> bool {
    if !widget.visible || widget.class_name.trim().is_empty() {
        return false;
    }
    let has_id = widget.resource_id.as_deref().is_some_and(|r| !r.is_empty());
    let has_text = widget
        .text
        .as_deref()
        .or(widget.content_desc.as_deref())
        .is_some_and(|t| !t.trim().is_empty());
    widget.is_interactive() || has_id || has_text
}

/// Equivalence function. Pure in (widget, context, level); `None` when the
/// widget cannot be classified.
pub fn reduce(
    widget: &ConcreteWidget,
    ctx: &ReducerContext<'_>,
    level: GranularityLevel,
) -> Option<AbstractionKey> {
    if widget.class_name.trim().is_empty() {
        return None;
    }

    let mut key = AbstractionKey::new();
    key.set(Attribute::ClassName, widget.class_name.clone());
    if let Some(res) = widget.resource_id.as_deref().filter(|r| !r.is_empty()) {
        key.set(Attribute::ResourceId, res);
    }
    key.set(Attribute::AncestorPath, ctx.ancestor_path(widget));

    for (attr, on) in [
        (Attribute::Clickable, widget.clickable),
        (Attribute::LongClickable, widget.long_clickable),
        (Attribute::Checkable, widget.checkable),
        (Attribute::Scrollable, widget.scrollable),
        (Attribute::Editable, widget.editable),
    ] {
        if on {
            key.set(attr, "true");
        }
    }

    if level.includes(GranularityLevel::State) {
        key.set(Attribute::Enabled, widget.enabled.to_string());
        key.set(Attribute::Checked, widget.checked.to_string());
        key.set(Attribute::Selected, widget.selected.to_string());
    }

    if level.includes(GranularityLevel::Content) {
        // Text typed into editable fields is run-specific input, not content.
        let text = if widget.editable {
            None
        } else {
            widget.text.as_deref().and_then(normalize_text)
        };
        key.set(Attribute::Text, text.unwrap_or_default());
        let desc = widget.content_desc.as_deref().and_then(normalize_text);
        key.set(Attribute::ContentDesc, desc.unwrap_or_default());
    }

    if level.includes(GranularityLevel::Position) {
        key.set(Attribute::SiblingIndex, ctx.sibling_index(widget).to_string());
        key.set(Attribute::ChildCount, ctx.child_count(widget).to_string());
    }

    Some(key)
}

/// Key of a statically declared element: class and resource id only. Used to
/// target template actions at elements absent from the current screen.
pub fn static_key(class_name: &str, resource_id: Option<&str>) -> AbstractionKey {
    let mut key = AbstractionKey::new();
    key.set(Attribute::ClassName, class_name);
    if let Some(res) = resource_id.filter(|r| !r.is_empty()) {
        key.set(Attribute::ResourceId, res);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ConcreteObservation {
        ConcreteObservation {
            window: "Main".into(),
            widgets: vec![
                ConcreteWidget {
                    index: 0,
                    class_name: "android.widget.FrameLayout".into(),
                    ..Default::default()
                },
                ConcreteWidget {
                    index: 1,
                    parent: Some(0),
                    class_name: "android.widget.Button".into(),
                    resource_id: Some("ok".into()),
                    text: Some("  OK ".into()),
                    clickable: true,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn higher_levels_only_add_attributes() {
        let obs = tree();
        let ctx = ReducerContext::new(WindowId(0), &obs);
        let button = obs.widget(1).unwrap();

        let mut previous = reduce(button, &ctx, GranularityLevel::Structure).unwrap();
        let mut level = GranularityLevel::Structure;
        while let Some(next) = level.next() {
            let finer = reduce(button, &ctx, next).unwrap();
            assert!(previous.is_coarsening_of(&finer), "{:?} -> {:?}", level, next);
            assert!(finer.len() > previous.len());
            previous = finer;
            level = next;
        }
    }

    #[test]
    fn structure_level_ignores_text() {
        let obs = tree();
        let ctx = ReducerContext::new(WindowId(0), &obs);
        let key = reduce(obs.widget(1).unwrap(), &ctx, GranularityLevel::Structure).unwrap();
        assert!(!key.has(Attribute::Text));
        assert_eq!(key.get(Attribute::AncestorPath), Some("FrameLayout"));
        assert!(key.capability(Attribute::Clickable));

        let content = reduce(obs.widget(1).unwrap(), &ctx, GranularityLevel::Content).unwrap();
        assert_eq!(content.get(Attribute::Text), Some("ok"));
    }

    #[test]
    fn decorative_and_unclassified_widgets_are_not_retained() {
        let obs = tree();
        assert!(!is_retained(obs.widget(0).unwrap()), "bare layout");
        assert!(is_retained(obs.widget(1).unwrap()));
        let blank = ConcreteWidget::default();
        assert!(reduce(&blank, &ReducerContext::new(WindowId(0), &obs), GranularityLevel::MAX).is_none());
    }
}
