use std::collections::HashMap;

use crate::abstraction::granularity::GranularityTable;
use crate::abstraction::state_store::AbstractStateStore;
use crate::engine::config::EngineConfig;
use crate::graph::template::StaticReferenceGraph;
use crate::graph::transition_graph::AbstractTransitionGraph;
use crate::model::element::ElementRegistry;
use crate::model::history::ObservationLog;
use crate::model::ids::{ObservationId, StateId, WindowId};
use crate::model::input::InputRegistry;
use crate::model::window::WindowRegistry;
use crate::trace::trace::EngineEvent;

/// Every registry of one exploration run. Components receive the context by
/// reference instead of reaching for process-wide state.
#[derive(Debug)]
pub struct ModelContext {
    pub config: EngineConfig,
    pub windows: WindowRegistry,
    pub elements: ElementRegistry,
    pub inputs: InputRegistry,
    pub granularity: GranularityTable,
    pub states: AbstractStateStore,
    pub graph: AbstractTransitionGraph,
    pub templates: StaticReferenceGraph,
    pub history: ObservationLog,
    /// Destination of the most recent reset or launch.
    pub reset_anchor: Option<ObservationId>,
    events: Vec<EngineEvent>,
}

impl ModelContext {
    pub fn new(config: EngineConfig) -> Self {
        let granularity = GranularityTable::new(config.reducer.max_level);
        Self {
            config,
            windows: WindowRegistry::new(),
            elements: ElementRegistry::new(),
            inputs: InputRegistry::new(),
            granularity,
            states: AbstractStateStore::new(),
            graph: AbstractTransitionGraph::new(),
            templates: StaticReferenceGraph::new(),
            history: ObservationLog::new(),
            reset_anchor: None,
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// State of the latest observation.
    pub fn current_state(&self) -> Option<StateId> {
        self.history
            .last_observation()
            .and_then(|o| self.states.state_of(o))
    }

    pub fn reset_anchor_state(&self) -> Option<StateId> {
        self.reset_anchor.and_then(|o| self.states.state_of(o))
    }

    /// Recent trace states, oldest first, collapsing consecutive repeats.
    pub fn recent_states(&self, limit: usize) -> Vec<StateId> {
        let mut recent: Vec<StateId> = Vec::new();
        let last = self.history.observation_count() as u32;
        for i in (0..last).rev() {
            if recent.len() >= limit {
                break;
            }
            if let Some(s) = self.states.state_of(ObservationId(i)) {
                if recent.last() != Some(&s) {
                    recent.push(s);
                }
            }
        }
        recent.reverse();
        recent
    }

    /// Number of states per active window.
    pub fn states_per_window(&self) -> HashMap<WindowId, usize> {
        let mut counts = HashMap::new();
        for state in self.states.iter() {
            *counts.entry(self.windows.active(state.window)).or_insert(0) += 1;
        }
        counts
    }
}
