use std::collections::{BTreeSet, HashMap};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::abstraction::reducer::structural_signature;
use crate::model::context::ModelContext;
use crate::model::element::NewElement;
use crate::model::error::Result;
use crate::model::ids::{ElementId, WindowId};
use crate::model::window::WindowKind;
use crate::observation::normalize::{normalize_text, simple_class_name};
use crate::observation::observation_model::ActionKind;

// ============================================================================
// Static reference artifact (offline analysis output)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticArtifact {
    #[serde(default)]
    pub windows: Vec<StaticWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticWindow {
    /// Window class identity, matched against `ConcreteObservation::window`.
    pub name: String,
    pub kind: WindowKind,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub elements: Vec<StaticElement>,
    #[serde(default)]
    pub inputs: Vec<StaticInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticElement {
    /// Artifact-local key, referenced by `parent` and `StaticInput::element`.
    pub key: String,
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(default, rename = "resourceId")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticInput {
    pub event: ActionKind,
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub handlers: BTreeSet<String>,
    /// Windows this input may lead to.
    #[serde(default)]
    pub targets: Vec<StaticTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticTarget {
    pub window: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 { 1 }

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactSummary {
    pub windows: usize,
    pub elements: usize,
    pub inputs: usize,
    pub template_transitions: usize,
    pub skipped: usize,
}

/// Parse the artifact into the context's registries and static reference
/// graph. Dangling references are skipped with a warning; a repeated input
/// declaration is an invariant violation and fails the load.
pub fn load_static_artifact(ctx: &mut ModelContext, artifact: &StaticArtifact) -> Result<ArtifactSummary> {
    let mut summary = ArtifactSummary::default();
    let mut window_ids: HashMap<&str, WindowId> = HashMap::new();

    for w in &artifact.windows {
        let (id, created) = ctx.windows.get_or_create(w.kind, &w.name, false);
        ctx.templates.get_or_create_template(id, false);
        window_ids.insert(w.name.as_str(), id);
        if created {
            summary.windows += 1;
        }
    }

    for w in &artifact.windows {
        let Some(&window) = window_ids.get(w.name.as_str()) else {
            continue;
        };
        if let Some(owner) = &w.owner {
            match window_ids.get(owner.as_str()) {
                Some(&o) => ctx.windows.set_owner(window, o)?,
                None => {
                    warn!("window '{}' names unknown owner '{}'", w.name, owner);
                    summary.skipped += 1;
                }
            }
        }

        let element_ids = load_elements(ctx, window, w, &mut summary)?;

        for input in &w.inputs {
            let element = match &input.element {
                Some(key) => match element_ids.get(key.as_str()) {
                    Some(&e) => Some(e),
                    None => {
                        warn!("input on '{}' names unknown element '{}'", w.name, key);
                        summary.skipped += 1;
                        continue;
                    }
                },
                None => None,
            };

            let id = ctx
                .inputs
                .create(input.event, element, window, input.handlers.clone(), false)?;
            ctx.windows.get_mut(window)?.inputs.insert(id);
            summary.inputs += 1;

            for target in &input.targets {
                let Some(&destination) = window_ids.get(target.window.as_str()) else {
                    warn!("input on '{}' targets unknown window '{}'", w.name, target.window);
                    summary.skipped += 1;
                    continue;
                };
                ctx.templates
                    .add_transition(window, destination, input.event, element, Some(id), target.weight);
                summary.template_transitions += 1;
            }
        }
    }

    info!(
        "loaded static artifact: {} windows, {} elements, {} inputs, {} template edges",
        summary.windows, summary.elements, summary.inputs, summary.template_transitions
    );
    Ok(summary)
}

fn load_elements<'a>(
    ctx: &mut ModelContext,
    window: WindowId,
    w: &'a StaticWindow,
    summary: &mut ArtifactSummary,
) -> Result<HashMap<&'a str, ElementId>> {
    let by_key: HashMap<&str, &StaticElement> = w.elements.iter().map(|e| (e.key.as_str(), e)).collect();
    let mut ids: HashMap<&str, ElementId> = HashMap::new();

    for element in &w.elements {
        let path = ancestor_path(element, &by_key);
        let signature = structural_signature(&path, &element.class_name, element.resource_id.as_deref());
        let (id, created) = ctx.elements.insert(NewElement {
            window,
            signature: &signature,
            class_name: &element.class_name,
            resource_id: element.resource_id.as_deref(),
            parent: None,
            runtime_created: false,
        });
        for text in element.texts.iter().filter_map(|t| normalize_text(t)) {
            ctx.elements.add_text(id, &text);
        }
        ctx.windows.get_mut(window)?.elements.insert(id);
        ids.insert(element.key.as_str(), id);
        if created {
            summary.elements += 1;
        }
    }

    for element in &w.elements {
        let Some(parent_key) = &element.parent else {
            continue;
        };
        match (ids.get(element.key.as_str()), ids.get(parent_key.as_str())) {
            (Some(&child), Some(&parent)) if child != parent => ctx.elements.set_parent(child, parent)?,
            _ => {
                warn!("element '{}' names unknown parent '{}'", element.key, parent_key);
                summary.skipped += 1;
            }
        }
    }

    Ok(ids)
}

/// Simple class names of the ancestors, root first, as a runtime widget
/// tree would report them.
fn ancestor_path(element: &StaticElement, by_key: &HashMap<&str, &StaticElement>) -> String {
    let mut chain = Vec::new();
    let mut seen = BTreeSet::new();
    let mut current = element.parent.as_deref();
    while let Some(key) = current {
        if !seen.insert(key) {
            break;
        }
        match by_key.get(key) {
            Some(parent) => {
                chain.push(simple_class_name(&parent.class_name));
                current = parent.parent.as_deref();
            }
            None => break,
        }
    }
    chain.reverse();
    chain.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::EngineConfig;
    use crate::model::error::ModelError;

    fn artifact() -> StaticArtifact {
        serde_json::from_value(serde_json::json!({
            "windows": [
                {
                    "name": "Main", "kind": "Activity",
                    "elements": [
                        { "key": "root", "className": "android.widget.FrameLayout" },
                        { "key": "go", "className": "android.widget.Button", "resourceId": "go", "parent": "root" }
                    ],
                    "inputs": [
                        { "event": "Click", "element": "go", "handlers": ["onGo"], "targets": [{ "window": "Detail" }] }
                    ]
                },
                { "name": "Detail", "kind": "Activity" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn elements_get_runtime_compatible_signatures() {
        let mut ctx = ModelContext::new(EngineConfig::default());
        let summary = load_static_artifact(&mut ctx, &artifact()).unwrap();
        assert_eq!(summary.windows, 2);
        assert_eq!(summary.template_transitions, 1);

        let main = ctx.windows.find(WindowKind::Activity, "Main").unwrap();
        assert!(ctx.elements.find(main, "FrameLayout/Button#go").is_some());
    }

    #[test]
    fn repeated_input_declaration_fails() {
        let mut doubled = artifact();
        let input = doubled.windows[0].inputs[0].clone();
        doubled.windows[0].inputs.push(input);
        let mut ctx = ModelContext::new(EngineConfig::default());
        let err = load_static_artifact(&mut ctx, &doubled).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateInput { .. }));
    }
}
