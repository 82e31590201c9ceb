use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::abstraction::abstract_state::StateSignature;
use crate::abstraction::granularity::GranularityScope;
use crate::abstraction::reducer::AbstractionKey;
use crate::engine::error::PersistError;
use crate::graph::template::{instantiate_implicit_edges, merge_template};
use crate::graph::transition_model::TransitionEvidence;
use crate::model::context::ModelContext;
use crate::model::element::NewElement;
use crate::model::ids::{ElementId, InputId, StateId, WindowId};
use crate::persist::rows::{
    table_file, ElementRow, GranularityRow, InputRow, StateRow, TransitionRow, WindowRow, ELEMENTS, GRANULARITY,
    INPUTS, STATES, TRANSITIONS, WINDOWS,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub windows: usize,
    pub elements: usize,
    pub inputs: usize,
    pub states: usize,
    pub transitions: usize,
    pub granularity: usize,
    /// Implicit edges are re-instantiated rather than loaded.
    pub implicit_skipped: usize,
    pub skipped: usize,
    pub missing_tables: Vec<&'static str>,
}

/// Persisted id to fresh id, per entity kind.
#[derive(Default)]
struct IdMap {
    windows: HashMap<WindowId, WindowId>,
    elements: HashMap<ElementId, ElementId>,
    inputs: HashMap<InputId, InputId>,
    states: HashMap<StateId, StateId>,
}

/// Load a dumped model into the context under fresh ids. Malformed or
/// dangling rows are skipped with a warning; missing tables load as empty.
pub fn load_model(ctx: &mut ModelContext, dir: &Path) -> Result<LoadReport, PersistError> {
    let mut report = LoadReport::default();
    let mut ids = IdMap::default();

    let windows: Vec<WindowRow> = read_table(dir, WINDOWS, &mut report);
    let elements: Vec<ElementRow> = read_table(dir, ELEMENTS, &mut report);
    let inputs: Vec<InputRow> = read_table(dir, INPUTS, &mut report);
    let states: Vec<StateRow> = read_table(dir, STATES, &mut report);
    let transitions: Vec<TransitionRow> = read_table(dir, TRANSITIONS, &mut report);
    let granularity: Vec<GranularityRow> = read_table(dir, GRANULARITY, &mut report);

    load_windows(ctx, &windows, &mut ids, &mut report)?;
    load_elements(ctx, &elements, &mut ids, &mut report)?;
    load_inputs(ctx, &inputs, &mut ids, &mut report)?;

    for row in &granularity {
        let Some(&window) = ids.windows.get(&row.window) else {
            report.skipped += 1;
            continue;
        };
        ctx.granularity
            .restore(GranularityScope::new(window, row.signature.clone()), row.level);
        report.granularity += 1;
    }

    let loaded = load_states(ctx, &states, &mut ids, &mut report)?;
    load_transitions(ctx, &transitions, &ids, &mut report);

    let windows: BTreeSet<WindowId> = loaded
        .iter()
        .filter_map(|s| ctx.states.get(*s).map(|s| s.window))
        .collect();
    for window in windows {
        merge_template(ctx, window)?;
    }
    for state in loaded {
        instantiate_implicit_edges(ctx, state)?;
    }

    info!(
        "loaded model from {}: {} states, {} transitions, {} rows skipped",
        dir.display(),
        report.states,
        report.transitions,
        report.skipped
    );
    Ok(report)
}

fn read_table<T: DeserializeOwned>(dir: &Path, table: &'static str, report: &mut LoadReport) -> Vec<T> {
    let path = dir.join(table_file(table));
    let file = match fs::File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            warn!("table {} not loaded ({}): {}", table, path.display(), e);
            report.missing_tables.push(table);
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("{}:{}: unreadable line: {}", table, n + 1, e);
                report.skipped += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!("{}:{}: skipping malformed row: {}", table, n + 1, e);
                report.skipped += 1;
            }
        }
    }
    rows
}

fn load_windows(
    ctx: &mut ModelContext,
    rows: &[WindowRow],
    ids: &mut IdMap,
    report: &mut LoadReport,
) -> Result<(), PersistError> {
    for row in rows {
        let (id, _) = ctx
            .windows
            .get_or_create(row.kind, &row.class_name, row.runtime_created);
        ids.windows.insert(row.id, id);
        report.windows += 1;
    }
    for row in rows {
        let Some(&id) = ids.windows.get(&row.id) else {
            continue;
        };
        if let Some(owner) = row.owner {
            match ids.windows.get(&owner) {
                Some(&o) => ctx.windows.set_owner(id, o)?,
                None => {
                    warn!("window {} has dangling owner {}", row.id, owner);
                    report.skipped += 1;
                }
            }
        }
        if let Some(into) = row.retired_into.and_then(|w| ids.windows.get(&w)) {
            if *into != id {
                ctx.windows.retire(id, *into)?;
            }
        }
    }
    Ok(())
}

fn load_elements(
    ctx: &mut ModelContext,
    rows: &[ElementRow],
    ids: &mut IdMap,
    report: &mut LoadReport,
) -> Result<(), PersistError> {
    for row in rows {
        let Some(&window) = ids.windows.get(&row.window) else {
            warn!("element {} references unknown window {}", row.id, row.window);
            report.skipped += 1;
            continue;
        };
        let (id, _) = ctx.elements.insert(NewElement {
            window,
            signature: &row.signature,
            class_name: &row.class_name,
            resource_id: row.resource_id.as_deref(),
            parent: None,
            runtime_created: row.runtime_created,
        });
        for text in &row.texts {
            ctx.elements.add_text(id, text);
        }
        ctx.windows.get_mut(window)?.elements.insert(id);
        ids.elements.insert(row.id, id);
        report.elements += 1;
    }
    for row in rows {
        let (Some(&child), Some(parent)) = (ids.elements.get(&row.id), row.parent) else {
            continue;
        };
        match ids.elements.get(&parent) {
            Some(&p) if p != child => ctx.elements.set_parent(child, p)?,
            _ => report.skipped += 1,
        }
    }
    Ok(())
}

fn load_inputs(
    ctx: &mut ModelContext,
    rows: &[InputRow],
    ids: &mut IdMap,
    report: &mut LoadReport,
) -> Result<(), PersistError> {
    for row in rows {
        let Some(&window) = ids.windows.get(&row.window) else {
            warn!("input {} references unknown window {}", row.id, row.window);
            report.skipped += 1;
            continue;
        };
        let element = match row.element {
            Some(e) => match ids.elements.get(&e) {
                Some(&mapped) => Some(mapped),
                None => {
                    warn!("input {} references unknown element {}", row.id, e);
                    report.skipped += 1;
                    continue;
                }
            },
            None => None,
        };
        let (id, _) = ctx.inputs.get_or_create(row.event, element, window);
        ctx.inputs.restore_evidence(
            id,
            &row.handlers,
            &row.verified_handlers,
            &row.covered_code,
            row.exercised,
        )?;
        ctx.windows.get_mut(window)?.inputs.insert(id);
        ids.inputs.insert(row.id, id);
        report.inputs += 1;
    }
    Ok(())
}

fn load_states(
    ctx: &mut ModelContext,
    rows: &[StateRow],
    ids: &mut IdMap,
    report: &mut LoadReport,
) -> Result<Vec<StateId>, PersistError> {
    let mut loaded = Vec::new();
    for row in rows {
        let Some(&window) = ids.windows.get(&row.window) else {
            warn!("state {} references unknown window {}", row.id, row.window);
            report.skipped += 1;
            continue;
        };

        let counts: BTreeMap<AbstractionKey, u32> = row
            .keys
            .iter()
            .map(|k| (AbstractionKey::from_pairs(k.attributes.iter().cloned()), k.count))
            .collect();
        let signature = StateSignature {
            window,
            keys: counts.keys().cloned().collect(),
            flags: row.flags,
        };
        let class_name = ctx
            .windows
            .get(window)
            .map(|w| w.class_name.clone())
            .unwrap_or_default();
        let hash = signature.hash_with(&class_name);
        if hash != row.hash {
            warn!("state {} hash changed on load ({} -> {})", row.id, row.hash, hash);
        }

        let (id, created) = ctx.states.get_or_create(signature, counts, hash);
        let state = ctx.states.get_mut(id)?;
        if created {
            state.loaded = true;
        }
        state.actions.extend(row.actions.iter().cloned());
        for mapping in &row.input_mapping {
            let inputs = mapping.inputs.iter().filter_map(|i| ids.inputs.get(i)).copied();
            state
                .input_mapping
                .entry(mapping.action.clone())
                .or_default()
                .extend(inputs);
        }
        ids.states.insert(row.id, id);
        loaded.push(id);
        report.states += 1;
    }
    Ok(loaded)
}

fn load_transitions(ctx: &mut ModelContext, rows: &[TransitionRow], ids: &IdMap, report: &mut LoadReport) {
    for row in rows {
        if row.implicit {
            report.implicit_skipped += 1;
            continue;
        }
        let (Some(&source), Some(&destination)) = (ids.states.get(&row.source), ids.states.get(&row.destination))
        else {
            warn!("transition {} references unknown states", row.id);
            report.skipped += 1;
            continue;
        };

        let evidence = TransitionEvidence {
            handlers: row.handlers.clone(),
            covered_code: row.covered_code.clone(),
            new_coverage: row.new_coverage,
            dependent_states: row
                .dependent_states
                .iter()
                .filter_map(|s| ids.states.get(s))
                .copied()
                .collect(),
            interactions: Vec::new(),
            inputs: row.inputs.iter().filter_map(|i| ids.inputs.get(i)).copied().collect(),
        };
        let prior_window = row.prior_window.and_then(|w| ids.windows.get(&w)).copied();
        ctx.graph.restore_explicit(
            source,
            row.action.clone(),
            destination,
            prior_window,
            row.guarded,
            evidence,
        );
        report.transitions += 1;
    }
}
