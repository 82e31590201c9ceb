use std::collections::{BTreeSet, HashMap};

use crate::model::ids::{InteractionId, ObservationId, WindowId};
use crate::observation::observation_model::{ConcreteObservation, Interaction};

/// One performed interaction with enough context to re-derive its abstract
/// transition after a rebuild.
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub id: InteractionId,
    pub interaction: Interaction,
    pub source: ObservationId,
    pub destination: ObservationId,
    /// Observation preceding the source in the trace.
    pub predecessor: Option<ObservationId>,
    pub prior_window: Option<WindowId>,
    pub coverage: BTreeSet<String>,
    pub new_coverage: bool,
}

/// Append-only log of concrete observations and the interactions between
/// them. Ids are positions in the log.
#[derive(Debug, Default)]
pub struct ObservationLog {
    observations: Vec<ConcreteObservation>,
    windows: HashMap<ObservationId, WindowId>,
    interactions: Vec<InteractionRecord>,
    touching: HashMap<ObservationId, Vec<InteractionId>>,
    seen_coverage: BTreeSet<String>,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_observation(&mut self, observation: ConcreteObservation) -> ObservationId {
        let id = ObservationId(self.observations.len() as u32);
        self.observations.push(observation);
        id
    }

    pub fn observation(&self, id: ObservationId) -> Option<&ConcreteObservation> {
        self.observations.get(id.0 as usize)
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn last_observation(&self) -> Option<ObservationId> {
        self.observations
            .len()
            .checked_sub(1)
            .map(|i| ObservationId(i as u32))
    }

    /// Window the observation resolved to most recently.
    pub fn window_of(&self, id: ObservationId) -> Option<WindowId> {
        self.windows.get(&id).copied()
    }

    pub(crate) fn set_window(&mut self, id: ObservationId, window: WindowId) {
        self.windows.insert(id, window);
    }

    /// Window of the most recent observation before `before` whose window
    /// differs from `current`. `resolve` maps stale windows to active ones.
    pub fn prior_window<F>(&self, before: ObservationId, current: WindowId, resolve: F) -> Option<WindowId>
    where
        F: Fn(WindowId) -> WindowId,
    {
        (0..before.0)
            .rev()
            .filter_map(|i| self.window_of(ObservationId(i)))
            .map(&resolve)
            .find(|w| *w != current)
    }

    pub fn push_interaction(
        &mut self,
        interaction: Interaction,
        source: ObservationId,
        destination: ObservationId,
        prior_window: Option<WindowId>,
        coverage: BTreeSet<String>,
    ) -> &InteractionRecord {
        let id = InteractionId(self.interactions.len() as u32);
        let new_coverage = coverage.iter().any(|c| !self.seen_coverage.contains(c));
        self.seen_coverage.extend(coverage.iter().cloned());

        let predecessor = source.0.checked_sub(1).map(ObservationId);
        self.interactions.push(InteractionRecord {
            id,
            interaction,
            source,
            destination,
            predecessor,
            prior_window,
            coverage,
            new_coverage,
        });
        self.touching.entry(source).or_default().push(id);
        if destination != source {
            self.touching.entry(destination).or_default().push(id);
        }
        &self.interactions[self.interactions.len() - 1]
    }

    pub fn interaction(&self, id: InteractionId) -> Option<&InteractionRecord> {
        self.interactions.get(id.0 as usize)
    }

    pub fn interactions(&self) -> &[InteractionRecord] {
        &self.interactions
    }

    /// Interactions with the observation as source or destination.
    pub fn interactions_touching(&self, id: ObservationId) -> &[InteractionId] {
        self.touching.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Every code element reported by the coverage feed so far.
    pub fn seen_coverage(&self) -> &BTreeSet<String> {
        &self.seen_coverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::observation_model::ActionKind;

    #[test]
    fn new_coverage_only_for_unseen_ids() {
        let mut log = ObservationLog::new();
        let a = log.push_observation(ConcreteObservation::default());
        let b = log.push_observation(ConcreteObservation::default());
        let first = log
            .push_interaction(Interaction::new(ActionKind::PressBack), a, b, None, ["m1".to_string()].into())
            .id;
        let second = log
            .push_interaction(Interaction::new(ActionKind::PressBack), b, a, None, ["m1".to_string()].into())
            .id;
        assert!(log.interaction(first).unwrap().new_coverage);
        assert!(!log.interaction(second).unwrap().new_coverage);
        assert_eq!(log.interactions_touching(a), &[first, second]);
    }

    #[test]
    fn prior_window_skips_same_window() {
        let mut log = ObservationLog::new();
        for (i, w) in [0, 1, 1].into_iter().enumerate() {
            let id = log.push_observation(ConcreteObservation::default());
            assert_eq!(id, ObservationId(i as u32));
            log.set_window(id, WindowId(w));
        }
        assert_eq!(log.prior_window(ObservationId(2), WindowId(1), |w| w), Some(WindowId(0)));
        assert_eq!(log.prior_window(ObservationId(0), WindowId(1), |w| w), None);
    }
}
