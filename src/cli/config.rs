use clap::{Parser, Subcommand};
use log::warn;

use crate::engine::config::EngineConfig;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "screen-abstraction",
    version,
    about = "Online abstraction and refinement of explored UI screens"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: abstraction.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Package under exploration (overrides the config file)
    #[arg(long, global = true)]
    pub app_package: Option<String>,

    /// JSONL engine trace destination (overrides the config file)
    #[arg(long, global = true)]
    pub trace: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed a JSONL observation stream through the engine
    Replay {
        /// Observation stream, one ObservedStep per line
        #[arg(long)]
        steps: String,

        /// Static reference artifact (JSON or YAML)
        #[arg(long)]
        artifact: Option<String>,

        /// Previously dumped model directory to start from
        #[arg(long)]
        model: Option<String>,

        /// Dump the resulting model into this directory
        #[arg(long)]
        dump: Option<String>,

        /// Output format: console, json
        #[arg(long, default_value = "console")]
        format: String,
    },

    /// Replay a stream, then plan from its final state to a window
    Plan {
        #[arg(long)]
        steps: String,

        #[arg(long)]
        artifact: Option<String>,

        #[arg(long)]
        model: Option<String>,

        /// Target window class name
        #[arg(long)]
        to: String,

        /// Start state hash (prefix); defaults to the final state
        #[arg(long)]
        from: Option<String>,

        #[arg(long, default_value_t = false)]
        allow_reset: bool,

        #[arg(long, default_value_t = false)]
        allow_static: bool,

        #[arg(long)]
        max_cost: Option<u32>,

        /// Progressively relax constraints when nothing is found
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        relax: bool,
    },
}

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> EngineConfig {
    let config_path = path.unwrap_or("abstraction.yaml");
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
            warn!("ignoring malformed config {}: {}", config_path, e);
            EngineConfig::default()
        }),
        Err(_) => EngineConfig::default(),
    }
}

/// Apply command-line overrides on top of the file config.
pub fn resolve_config(cli: &Cli) -> EngineConfig {
    let mut config = load_config(cli.config.as_deref());
    if let Some(package) = &cli.app_package {
        config.app_package = Some(package.clone());
    }
    if let Some(trace) = &cli.trace {
        config.trace_path = Some(trace.clone());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Some("/nonexistent/abstraction.yaml"));
        assert_eq!(config.planner.reset_weight, 5);
        assert!(config.fold_options_menus);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config: EngineConfig = serde_yaml::from_str("app_package: com.example\nplanner:\n  reset_weight: 9\n").unwrap();
        assert_eq!(config.app_package.as_deref(), Some("com.example"));
        assert_eq!(config.planner.reset_weight, 9);
        assert_eq!(config.planner.implicit_weight, 2);
        assert_eq!(config.refinement.max_rounds, 16);
    }
}
