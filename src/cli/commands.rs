use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::engine::config::EngineConfig;
use crate::engine::engine::Engine;
use crate::engine::error::{EngineError, Result};
use crate::graph::artifact::StaticArtifact;
use crate::model::window::WindowKind;
use crate::observation::observation_model::ObservedStep;
use crate::planner::planner::{Goal, PathConstraints, Relaxation};
use crate::report::console::format_console_report;

// ============================================================================
// replay subcommand
// ============================================================================

pub fn cmd_replay(
    config: EngineConfig,
    steps_path: &str,
    artifact: Option<&str>,
    model: Option<&str>,
    dump: Option<&str>,
    format: &str,
    verbose: u8,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(config, artifact, model)?;
    let steps = read_steps(steps_path)?;

    if verbose > 0 {
        eprintln!("Replaying {} steps from {}...", steps.len(), steps_path);
    }
    engine.replay(steps)?;

    if let Some(dir) = dump {
        let summary = engine.dump_model(Path::new(dir))?;
        eprintln!("Dumped {} states, {} transitions to {}/", summary.states, summary.transitions, dir);
    }

    let summary = engine.summary();
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print!("{}", format_console_report(&summary)),
    }
    Ok(())
}

// ============================================================================
// plan subcommand
// ============================================================================

#[allow(clippy::too_many_arguments)]
pub fn cmd_plan(
    config: EngineConfig,
    steps_path: &str,
    artifact: Option<&str>,
    model: Option<&str>,
    to: &str,
    from: Option<&str>,
    constraints: PathConstraints,
    relax: bool,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(config, artifact, model)?;
    engine.replay(read_steps(steps_path)?)?;

    let start = match from {
        Some(hash) => engine.with_context(|ctx| ctx.states.find_by_hash(hash))?,
        None => engine.current_state().ok_or(EngineError::NoCurrentState)?,
    };
    let window = engine
        .with_context(|ctx| {
            ctx.windows
                .find(WindowKind::Activity, to)
                .or_else(|| ctx.windows.find_by_class(to))
        })
        .ok_or_else(|| EngineError::UnknownTarget(format!("window {}", to)))?;

    let goal = Goal::Window(window);
    let (paths, relaxation) = if relax {
        engine.find_paths_relaxed(start, &goal, &constraints)
    } else {
        (engine.find_paths(start, &goal, &constraints), Relaxation::None)
    };

    if paths.is_empty() {
        println!("No path from {} to {}", start, to);
        return Ok(());
    }

    println!("{} paths from {} to {} (relaxation: {:?})", paths.len(), start, to, relaxation);
    for (i, path) in paths.iter().enumerate() {
        println!("  #{} cost {} ({} steps)", i + 1, path.cost, path.len());
        for step in &path.steps {
            let marker = if step.reset {
                "reset"
            } else if step.implicit {
                "implicit"
            } else {
                "explicit"
            };
            println!("      {} --{}--> {} [{}]", step.source, step.action, step.destination, marker);
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn build_engine(config: EngineConfig, artifact: Option<&str>, model: Option<&str>) -> Result<Engine> {
    let engine = Engine::new(config);
    if let Some(path) = artifact {
        engine.load_static(&read_artifact(path)?)?;
    }
    if let Some(dir) = model {
        engine.load_model(Path::new(dir))?;
    }
    Ok(engine)
}

/// Read an observation stream: one JSON `ObservedStep` per line.
pub fn read_steps(path: &str) -> Result<Vec<ObservedStep>> {
    let file = std::fs::File::open(path).map_err(|e| EngineError::io(format!("opening {}", path), e))?;
    let mut steps = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| EngineError::io(format!("reading {}", path), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let step = serde_json::from_str(&line).map_err(|e| EngineError::json(format!("{}:{}", path, n + 1), e))?;
        steps.push(step);
    }
    Ok(steps)
}

/// Read a static artifact, YAML by extension, JSON otherwise.
pub fn read_artifact(path: &str) -> Result<StaticArtifact> {
    let content = std::fs::read_to_string(path).map_err(|e| EngineError::io(format!("reading {}", path), e))?;
    let is_yaml = Path::new(path)
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml");
    if is_yaml {
        serde_yaml::from_str(&content).map_err(|source| EngineError::Yaml {
            context: path.to_string(),
            source,
        })
    } else {
        serde_json::from_str(&content).map_err(|e| EngineError::json(path.to_string(), e))
    }
}
