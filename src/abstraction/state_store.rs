use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::abstraction::abstract_state::{derive_actions, AbstractState, StateSignature};
use crate::abstraction::reducer::AbstractionKey;
use crate::model::error::{ModelError, Result};
use crate::model::ids::{ObservationId, StateId, WindowId};

/// Registry of abstract states with get-or-create semantics over
/// [`StateSignature`]. Every attached observation maps to exactly one state.
#[derive(Debug, Default)]
pub struct AbstractStateStore {
    states: BTreeMap<StateId, AbstractState>,
    index: HashMap<StateSignature, StateId>,
    by_window: HashMap<WindowId, BTreeSet<StateId>>,
    observation_state: HashMap<ObservationId, StateId>,
    visits: HashMap<(StateId, WindowId), u32>,
    next_id: u32,
}

impl AbstractStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: StateId) -> Option<&AbstractState> {
        self.states.get(&id)
    }

    pub fn get_mut(&mut self, id: StateId) -> Result<&mut AbstractState> {
        self.states.get_mut(&id).ok_or(ModelError::UnknownState(id))
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbstractState> {
        self.states.values()
    }

    pub fn ids(&self) -> Vec<StateId> {
        self.states.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn find(&self, signature: &StateSignature) -> Option<StateId> {
        self.index.get(signature).copied()
    }

    /// State whose hash equals `prefix` or is the only one starting with it.
    pub fn find_by_hash(&self, prefix: &str) -> Result<StateId> {
        if prefix.is_empty() {
            return Err(ModelError::EmptyHashPrefix);
        }
        if let Some(exact) = self.states.values().find(|s| s.hash == prefix) {
            return Ok(exact.id);
        }
        let matches: Vec<StateId> = self
            .states
            .values()
            .filter(|s| s.hash.starts_with(prefix))
            .map(|s| s.id)
            .collect();
        match matches.as_slice() {
            [] => Err(ModelError::UnknownHash(prefix.to_string())),
            [id] => Ok(*id),
            _ => Err(ModelError::AmbiguousHash {
                prefix: prefix.to_string(),
                matches: matches.len(),
            }),
        }
    }

    pub fn states_of(&self, window: WindowId) -> Vec<StateId> {
        self.by_window
            .get(&window)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Look up by signature or register a new state. Returns the id and
    /// whether it was created.
    pub fn get_or_create(
        &mut self,
        signature: StateSignature,
        counts: BTreeMap<AbstractionKey, u32>,
        hash: String,
    ) -> (StateId, bool) {
        if let Some(id) = self.find(&signature) {
            return (id, false);
        }

        let id = StateId(self.next_id);
        self.next_id += 1;

        let mut keys = counts;
        for key in &signature.keys {
            keys.entry(key.clone()).or_insert(1);
        }
        keys.retain(|k, _| signature.keys.contains(k));

        let state = AbstractState {
            id,
            window: signature.window,
            actions: derive_actions(&keys, &signature.flags),
            keys,
            flags: signature.flags,
            hash,
            observations: BTreeSet::new(),
            input_mapping: BTreeMap::new(),
            loaded: false,
        };

        self.by_window
            .entry(signature.window)
            .or_default()
            .insert(id);
        self.index.insert(signature, id);
        self.states.insert(id, state);
        (id, true)
    }

    /// Attach an observation, detaching it from any previous state.
    pub fn attach(&mut self, state: StateId, observation: ObservationId) -> Result<()> {
        if !self.states.contains_key(&state) {
            return Err(ModelError::UnknownState(state));
        }
        self.detach(observation);
        if let Some(s) = self.states.get_mut(&state) {
            s.observations.insert(observation);
        }
        self.observation_state.insert(observation, state);
        Ok(())
    }

    pub fn detach(&mut self, observation: ObservationId) -> Option<StateId> {
        let previous = self.observation_state.remove(&observation)?;
        if let Some(s) = self.states.get_mut(&previous) {
            s.observations.remove(&observation);
        }
        Some(previous)
    }

    pub fn state_of(&self, observation: ObservationId) -> Option<StateId> {
        self.observation_state.get(&observation).copied()
    }

    /// Remove a state and every index entry pointing at it.
    pub fn remove(&mut self, id: StateId) -> Option<AbstractState> {
        let state = self.states.remove(&id)?;
        self.index.remove(&state.signature());
        if let Some(set) = self.by_window.get_mut(&state.window) {
            set.remove(&id);
        }
        for obs in &state.observations {
            self.observation_state.remove(obs);
        }
        self.visits.retain(|(s, _), _| *s != id);
        Some(state)
    }

    pub fn record_visit(&mut self, state: StateId, window: WindowId) -> u32 {
        let count = self.visits.entry((state, window)).or_insert(0);
        *count += 1;
        *count
    }

    /// Resolution counter per (state, window), consumed by prioritization.
    pub fn visit_count(&self, state: StateId, window: WindowId) -> u32 {
        self.visits.get(&(state, window)).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstraction::abstract_state::StateFlags;
    use crate::abstraction::reducer::{static_key, AbstractionKey};

    fn signature(window: u32, keys: &[AbstractionKey]) -> StateSignature {
        StateSignature {
            window: WindowId(window),
            keys: keys.iter().cloned().collect(),
            flags: StateFlags::default(),
        }
    }

    #[test]
    fn get_or_create_deduplicates_by_signature() {
        let mut store = AbstractStateStore::new();
        let k = static_key("Button", Some("ok"));
        let (a, created) = store.get_or_create(signature(0, &[k.clone()]), BTreeMap::new(), "h".into());
        assert!(created);
        let (b, created) = store.get_or_create(signature(0, &[k]), BTreeMap::new(), "h".into());
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(store.states_of(WindowId(0)), vec![a]);
    }

    #[test]
    fn hash_lookup_needs_a_unique_prefix() {
        let mut store = AbstractStateStore::new();
        let (a, _) = store.get_or_create(signature(0, &[]), BTreeMap::new(), "ab12".into());
        let (b, _) = store.get_or_create(signature(1, &[]), BTreeMap::new(), "ab34".into());

        assert_eq!(store.find_by_hash("ab12"), Ok(a));
        assert_eq!(store.find_by_hash("ab3"), Ok(b));
        assert_eq!(store.find_by_hash(""), Err(ModelError::EmptyHashPrefix));
        assert_eq!(
            store.find_by_hash("ab"),
            Err(ModelError::AmbiguousHash { prefix: "ab".into(), matches: 2 })
        );
        assert_eq!(store.find_by_hash("ff"), Err(ModelError::UnknownHash("ff".into())));
    }

    #[test]
    fn attach_moves_observation_between_states() {
        let mut store = AbstractStateStore::new();
        let (a, _) = store.get_or_create(signature(0, &[]), BTreeMap::new(), "a".into());
        let (b, _) = store.get_or_create(signature(1, &[]), BTreeMap::new(), "b".into());
        store.attach(a, ObservationId(3)).unwrap();
        store.attach(b, ObservationId(3)).unwrap();
        assert_eq!(store.state_of(ObservationId(3)), Some(b));
        assert!(store.get(a).unwrap().observations.is_empty());
    }

    #[test]
    fn remove_drops_index_entries() {
        let mut store = AbstractStateStore::new();
        let sig = signature(0, &[]);
        let (a, _) = store.get_or_create(sig.clone(), BTreeMap::new(), "a".into());
        store.attach(a, ObservationId(1)).unwrap();
        store.record_visit(a, WindowId(0));
        store.remove(a);
        assert!(store.find(&sig).is_none());
        assert!(store.state_of(ObservationId(1)).is_none());
        assert_eq!(store.visit_count(a, WindowId(0)), 0);
    }
}
