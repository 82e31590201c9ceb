pub mod abstraction;
pub mod cli;
pub mod engine;
pub mod graph;
pub mod model;
pub mod observation;
pub mod persist;
pub mod planner;
pub mod refinement;
pub mod report;
pub mod trace;

pub use crate::engine::config::EngineConfig;
pub use crate::engine::engine::{Engine, StepOutcome};
pub use crate::engine::error::{EngineError, PersistError};
pub use crate::model::context::ModelContext;
pub use crate::observation::observation_model::{ConcreteObservation, ConcreteWidget, Interaction, ObservedStep};
pub use crate::planner::planner::{Goal, PathConstraints, Relaxation};
