use serde::{Deserialize, Serialize};

use crate::abstraction::reducer::GranularityLevel;

// ============================================================================
// Engine configuration
// ============================================================================

/// Configuration for one exploration run of the abstraction engine.
///
/// Loaded from the optional YAML config file (see `cli::config`) and
/// overridden by command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Package considered in scope. Screens of any other package resolve to
    /// the out-of-scope state. `None` accepts every package.
    #[serde(default)]
    pub app_package: Option<String>,

    /// Packages whose screens are system permission dialogs.
    #[serde(default = "default_permission_packages")]
    pub permission_packages: Vec<String>,

    #[serde(default)]
    pub reducer: ReducerConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Fold options-menu windows into their owning activity on first use.
    #[serde(default = "default_true")]
    pub fold_options_menus: bool,

    /// JSONL engine trace destination (disabled when absent).
    #[serde(default)]
    pub trace_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_package: None,
            permission_packages: default_permission_packages(),
            reducer: ReducerConfig::default(),
            planner: PlannerConfig::default(),
            refinement: RefinementConfig::default(),
            fold_options_menus: true,
            trace_path: None,
        }
    }
}

impl EngineConfig {
    pub fn for_package(package: impl Into<String>) -> Self {
        Self {
            app_package: Some(package.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerConfig {
    /// Highest granularity level refinement may reach.
    #[serde(default = "default_max_level")]
    pub max_level: GranularityLevel,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            max_level: default_max_level(),
        }
    }
}

/// Edge weights and result limits for the path planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_one")]
    pub explicit_weight: u32,

    /// Unconfirmed (template-backed or anchor) edges.
    #[serde(default = "default_two")]
    pub implicit_weight: u32,

    /// Reset/launch edges, weighted to discourage restarting.
    #[serde(default = "default_five")]
    pub reset_weight: u32,

    #[serde(default = "default_five_usize")]
    pub max_results: usize,

    #[serde(default)]
    pub max_cost: Option<u32>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            explicit_weight: 1,
            implicit_weight: 2,
            reset_weight: 5,
            max_results: 5,
            max_cost: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Upper bound on rebuild rounds for a single trigger.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

// Serde default helpers
fn default_true() -> bool { true }
fn default_one() -> u32 { 1 }
fn default_two() -> u32 { 2 }
fn default_five() -> u32 { 5 }
fn default_five_usize() -> usize { 5 }
fn default_max_rounds() -> u32 { 16 }
fn default_max_level() -> GranularityLevel { GranularityLevel::Position }

fn default_permission_packages() -> Vec<String> {
    vec![
        "com.android.permissioncontroller".to_string(),
        "com.google.android.permissioncontroller".to_string(),
        "com.android.packageinstaller".to_string(),
        "com.google.android.packageinstaller".to_string(),
    ]
}
