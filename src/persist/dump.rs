use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::engine::error::PersistError;
use crate::model::context::ModelContext;
use crate::persist::rows::{
    table_file, ElementRow, GranularityRow, InputRow, KeyRow, MappingRow, StateRow, TransitionRow, WindowRow,
    ELEMENTS, GRANULARITY, INPUTS, STATES, TRANSITIONS, WINDOWS,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DumpSummary {
    pub windows: usize,
    pub elements: usize,
    pub inputs: usize,
    pub states: usize,
    pub transitions: usize,
    pub granularity: usize,
}

/// Write the model as one JSON-lines file per table.
pub fn dump_model(ctx: &ModelContext, dir: &Path) -> Result<DumpSummary, PersistError> {
    fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let windows: Vec<WindowRow> = ctx
        .windows
        .iter()
        .map(|w| WindowRow {
            id: w.id,
            kind: w.kind,
            class_name: w.class_name.clone(),
            owner: w.owner,
            retired_into: w.retired_into,
            runtime_created: w.runtime_created,
        })
        .collect();

    let elements: Vec<ElementRow> = ctx
        .elements
        .iter()
        .map(|e| ElementRow {
            id: e.id,
            window: e.window,
            signature: e.signature.clone(),
            class_name: e.class_name.clone(),
            resource_id: e.resource_id.clone(),
            parent: e.parent,
            texts: e.texts.iter().cloned().collect(),
            runtime_created: e.runtime_created,
        })
        .collect();

    let inputs: Vec<InputRow> = ctx
        .inputs
        .iter()
        .map(|i| InputRow {
            id: i.id,
            event: i.event,
            element: i.element,
            window: i.window,
            handlers: i.handlers.clone(),
            verified_handlers: i.verified_handlers.clone(),
            covered_code: i.covered_code.clone(),
            exercised: i.exercised,
            runtime_created: i.runtime_created,
        })
        .collect();

    let states: Vec<StateRow> = ctx
        .states
        .iter()
        .map(|s| StateRow {
            id: s.id,
            window: s.window,
            hash: s.hash.clone(),
            flags: s.flags,
            keys: s
                .keys
                .iter()
                .map(|(k, count)| KeyRow {
                    attributes: k.attributes().cloned().collect(),
                    count: *count,
                })
                .collect(),
            actions: s.actions.iter().cloned().collect(),
            input_mapping: s
                .input_mapping
                .iter()
                .map(|(action, inputs)| MappingRow {
                    action: action.clone(),
                    inputs: inputs.iter().copied().collect(),
                })
                .collect(),
            observations: s.observations.len(),
        })
        .collect();

    let transitions: Vec<TransitionRow> = ctx
        .graph
        .iter()
        .map(|t| TransitionRow {
            id: t.id,
            source: t.source,
            destination: t.destination,
            action: t.action.clone(),
            prior_window: t.prior_window,
            implicit: t.implicit,
            guarded: t.guarded,
            handlers: t.evidence.handlers.clone(),
            covered_code: t.evidence.covered_code.clone(),
            new_coverage: t.evidence.new_coverage,
            dependent_states: t.evidence.dependent_states.iter().copied().collect(),
            inputs: t.evidence.inputs.iter().copied().collect(),
            interactions: t.evidence.interactions.len(),
        })
        .collect();

    let granularity: Vec<GranularityRow> = ctx
        .granularity
        .scopes()
        .map(|(scope, level)| GranularityRow {
            window: scope.window,
            signature: scope.signature.clone(),
            level: *level,
        })
        .collect();

    write_table(dir, WINDOWS, &windows)?;
    write_table(dir, ELEMENTS, &elements)?;
    write_table(dir, INPUTS, &inputs)?;
    write_table(dir, STATES, &states)?;
    write_table(dir, TRANSITIONS, &transitions)?;
    write_table(dir, GRANULARITY, &granularity)?;

    let summary = DumpSummary {
        windows: windows.len(),
        elements: elements.len(),
        inputs: inputs.len(),
        states: states.len(),
        transitions: transitions.len(),
        granularity: granularity.len(),
    };
    info!("dumped model to {}: {:?}", dir.display(), summary);
    Ok(summary)
}

fn write_table<T: Serialize>(dir: &Path, table: &'static str, rows: &[T]) -> Result<(), PersistError> {
    let path = dir.join(table_file(table));
    let write_err = |source| PersistError::Write {
        path: path.display().to_string(),
        source,
    };

    let file = fs::File::create(&path).map_err(write_err)?;
    let mut out = BufWriter::new(file);
    for row in rows {
        let line = serde_json::to_string(row).map_err(|source| PersistError::Serialize { table, source })?;
        writeln!(out, "{}", line).map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;
    Ok(())
}
