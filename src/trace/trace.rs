use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::abstraction::reducer::GranularityLevel;
use crate::model::ids::{InteractionId, StateId, TransitionId, WindowId};

/// Structured engine events, drained to the JSONL trace after every step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StateCreated {
        state: StateId,
        window: WindowId,
        hash: String,
    },
    TransitionRecorded {
        transition: TransitionId,
        source: StateId,
        destination: StateId,
        action: String,
        outcome: &'static str,
        replay: bool,
    },
    InconsistencyDetected {
        interaction: InteractionId,
        source: StateId,
        action: String,
        destinations: Vec<StateId>,
    },
    GranularityRaised {
        window: WindowId,
        signature: String,
        from: GranularityLevel,
        to: GranularityLevel,
    },
    RebuildFinished {
        window: WindowId,
        observations: usize,
        states_before: usize,
        states_after: usize,
        pruned: Vec<StateId>,
        interactions: usize,
    },
    RefinementExhausted {
        source: StateId,
        action: String,
        destinations: Vec<StateId>,
        rounds: u32,
    },
    WindowFolded {
        window: WindowId,
        into: WindowId,
        elements: usize,
        inputs: usize,
    },
    StatesCollected {
        states: Vec<StateId>,
    },
}

#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u128,
    pub step: u64,

    #[serde(flatten)]
    pub event: EngineEvent,
}

impl TraceEvent {
    pub fn now(step: u64, event: EngineEvent) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            step,
            event,
        }
    }
}
