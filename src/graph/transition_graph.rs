use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, EdgeReference, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::abstraction::abstract_state::AbstractAction;
use crate::graph::transition_model::{AbstractTransition, RecordOutcome, TransitionEvidence, TransitionRecord};
use crate::model::error::Result;
use crate::model::ids::{InputId, InteractionId, StateId, TemplateTransitionId, TransitionId, WindowId};
use crate::model::input::InputRegistry;

/// Directed multigraph over abstract states. Nodes carry the state id and
/// edges carry the transition with its evidence; the stable graph keeps every
/// other index valid when one edge or node is removed.
#[derive(Debug, Default)]
pub struct AbstractTransitionGraph {
    graph: StableDiGraph<StateId, AbstractTransition>,
    nodes: HashMap<StateId, NodeIndex>,
    edges: BTreeMap<TransitionId, EdgeIndex>,
    by_interaction: HashMap<InteractionId, TransitionId>,
    next_id: u32,
}

impl AbstractTransitionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TransitionId) -> Option<&AbstractTransition> {
        self.edges.get(&id).and_then(|e| self.graph.edge_weight(*e))
    }

    fn get_mut(&mut self, id: TransitionId) -> Option<&mut AbstractTransition> {
        let edge = *self.edges.get(&id)?;
        self.graph.edge_weight_mut(edge)
    }

    /// Every transition, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &AbstractTransition> {
        self.edges.values().filter_map(|e| self.graph.edge_weight(*e))
    }

    pub fn len(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    pub fn explicit_count(&self) -> usize {
        self.iter().filter(|t| t.is_explicit()).count()
    }

    pub fn implicit_count(&self) -> usize {
        self.iter().filter(|t| t.implicit).count()
    }

    /// Edge references leaving (or entering) `state`. Unknown states have none.
    pub fn edges_directed(
        &self,
        state: StateId,
        direction: Direction,
    ) -> impl Iterator<Item = EdgeReference<'_, AbstractTransition>> {
        self.nodes
            .get(&state)
            .into_iter()
            .flat_map(move |node| self.graph.edges_directed(*node, direction))
    }

    pub fn outgoing(&self, state: StateId) -> impl Iterator<Item = &AbstractTransition> {
        self.edges_directed(state, Direction::Outgoing).map(|e| e.weight())
    }

    pub fn incoming(&self, state: StateId) -> impl Iterator<Item = &AbstractTransition> {
        self.edges_directed(state, Direction::Incoming).map(|e| e.weight())
    }

    /// State stored at a graph node.
    pub fn state_at(&self, node: NodeIndex) -> Option<StateId> {
        self.graph.node_weight(node).copied()
    }

    /// Ids of every edge with `state` as source or destination.
    pub fn touching(&self, state: StateId) -> BTreeSet<TransitionId> {
        self.outgoing(state)
            .chain(self.incoming(state))
            .map(|t| t.id)
            .collect()
    }

    pub fn transition_for_interaction(&self, interaction: InteractionId) -> Option<TransitionId> {
        self.by_interaction.get(&interaction).copied()
    }

    /// Explicit edge with the full identity (source, action, prior window, destination).
    pub fn lookup(
        &self,
        source: StateId,
        action: &AbstractAction,
        prior_window: Option<WindowId>,
        destination: StateId,
    ) -> Option<TransitionId> {
        self.outgoing(source)
            .find(|t| {
                t.is_explicit()
                    && t.destination == destination
                    && t.prior_window == prior_window
                    && &t.action == action
            })
            .map(|t| t.id)
    }

    fn lookup_implicit(&self, source: StateId, action: &AbstractAction, destination: StateId) -> Option<TransitionId> {
        self.outgoing(source)
            .find(|t| t.implicit && t.destination == destination && &t.action == action)
            .map(|t| t.id)
    }

    fn node(&mut self, state: StateId) -> NodeIndex {
        if let Some(node) = self.nodes.get(&state) {
            return *node;
        }
        let node = self.graph.add_node(state);
        self.nodes.insert(state, node);
        node
    }

    fn insert(&mut self, transition: AbstractTransition) -> TransitionId {
        let id = transition.id;
        let source = self.node(transition.source);
        let destination = self.node(transition.destination);
        for x in &transition.evidence.interactions {
            self.by_interaction.insert(*x, id);
        }
        let edge = self.graph.add_edge(source, destination, transition);
        self.edges.insert(id, edge);
        id
    }

    fn allocate(&mut self) -> TransitionId {
        let id = TransitionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Record an observed traversal. Evidence is merged into a matching
    /// explicit edge, promotes a matching implicit edge, or creates a new
    /// explicit edge. This is the single place where transition and input
    /// evidence is mutated.
    pub fn record_transition(
        &mut self,
        inputs: &mut InputRegistry,
        record: TransitionRecord,
    ) -> Result<RecordOutcome> {
        let handlers = match record.input {
            Some(input) => inputs.absorb_coverage(input, &record.coverage, !record.replay)?,
            None => BTreeSet::new(),
        };

        let evidence = TransitionEvidence {
            handlers,
            covered_code: record.coverage,
            new_coverage: record.new_coverage,
            dependent_states: record.dependent_state.into_iter().collect(),
            interactions: record.interaction.into_iter().collect(),
            inputs: record.input.into_iter().collect(),
        };

        let outcome = if let Some(id) =
            self.lookup(record.source, &record.action, record.prior_window, record.destination)
        {
            self.merge_evidence(id, evidence);
            RecordOutcome::Merged(id)
        } else if let Some(id) = self.lookup_implicit(record.source, &record.action, record.destination) {
            if let Some(t) = self.get_mut(id) {
                t.implicit = false;
                t.prior_window = record.prior_window;
            }
            self.merge_evidence(id, evidence);
            RecordOutcome::Promoted(id)
        } else {
            let id = self.allocate();
            self.insert(AbstractTransition {
                id,
                source: record.source,
                destination: record.destination,
                action: record.action,
                prior_window: record.prior_window,
                implicit: false,
                template: None,
                guarded: false,
                evidence,
            });
            RecordOutcome::Created(id)
        };

        Ok(outcome)
    }

    fn merge_evidence(&mut self, id: TransitionId, evidence: TransitionEvidence) {
        let new_interactions = evidence.interactions.clone();
        if let Some(t) = self.get_mut(id) {
            t.evidence.merge(evidence);
        }
        for x in new_interactions {
            self.by_interaction.insert(x, id);
        }
    }

    /// Add an unconfirmed edge unless any edge with the same (source, action,
    /// destination) already exists.
    pub fn add_implicit(
        &mut self,
        source: StateId,
        action: AbstractAction,
        destination: StateId,
        template: Option<TemplateTransitionId>,
    ) -> Option<TransitionId> {
        let exists = self
            .outgoing(source)
            .any(|t| t.destination == destination && t.action == action);
        if exists {
            return None;
        }
        let id = self.allocate();
        Some(self.insert(AbstractTransition {
            id,
            source,
            destination,
            action,
            prior_window: None,
            implicit: true,
            template,
            guarded: false,
            evidence: TransitionEvidence::default(),
        }))
    }

    /// Restore a persisted explicit edge, merging into an identical one.
    pub(crate) fn restore_explicit(
        &mut self,
        source: StateId,
        action: AbstractAction,
        destination: StateId,
        prior_window: Option<WindowId>,
        guarded: bool,
        evidence: TransitionEvidence,
    ) -> TransitionId {
        if let Some(id) = self.lookup(source, &action, prior_window, destination) {
            self.merge_evidence(id, evidence);
            return id;
        }
        let id = self.allocate();
        self.insert(AbstractTransition {
            id,
            source,
            destination,
            action,
            prior_window,
            implicit: false,
            template: None,
            guarded,
            evidence,
        })
    }

    pub fn remove(&mut self, id: TransitionId) -> Option<AbstractTransition> {
        let edge = self.edges.remove(&id)?;
        let t = self.graph.remove_edge(edge)?;
        for x in &t.evidence.interactions {
            if self.by_interaction.get(x) == Some(&id) {
                self.by_interaction.remove(x);
            }
        }
        Some(t)
    }

    pub fn remove_touching(&mut self, state: StateId) -> Vec<AbstractTransition> {
        let removed = self
            .touching(state)
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect();
        if let Some(node) = self.nodes.remove(&state) {
            self.graph.remove_node(node);
        }
        removed
    }

    /// Explicit edges sharing (source, action, prior window) with `id`, itself included.
    pub fn siblings(&self, id: TransitionId) -> Vec<TransitionId> {
        let Some(t) = self.get(id) else {
            return Vec::new();
        };
        let mut siblings: Vec<TransitionId> = self
            .outgoing(t.source)
            .filter(|o| o.is_explicit() && o.action == t.action && o.prior_window == t.prior_window)
            .map(|o| o.id)
            .collect();
        siblings.sort();
        siblings
    }

    pub fn mark_guarded(&mut self, ids: &[TransitionId]) {
        for id in ids {
            if let Some(t) = self.get_mut(*id) {
                t.guarded = true;
            }
        }
    }

    /// Rewrite input references after inputs were merged by a window fold.
    pub fn remap_inputs(&mut self, remap: &HashMap<InputId, InputId>) {
        if remap.is_empty() {
            return;
        }
        for edge in self.edges.values() {
            let Some(t) = self.graph.edge_weight_mut(*edge) else {
                continue;
            };
            t.evidence.inputs = t
                .evidence
                .inputs
                .iter()
                .map(|i| remap.get(i).copied().unwrap_or(*i))
                .collect();
        }
    }

    /// Replace references to removed states in dependent-state sets with the
    /// states their observations now resolve to.
    pub fn remap_dependent_states(&mut self, remap: &HashMap<StateId, BTreeSet<StateId>>) {
        if remap.is_empty() {
            return;
        }
        for edge in self.edges.values() {
            let Some(t) = self.graph.edge_weight_mut(*edge) else {
                continue;
            };
            let stale: Vec<StateId> = t
                .evidence
                .dependent_states
                .iter()
                .filter(|s| remap.contains_key(s))
                .copied()
                .collect();
            for s in stale {
                t.evidence.dependent_states.remove(&s);
                if let Some(replacements) = remap.get(&s) {
                    t.evidence.dependent_states.extend(replacements.iter().copied());
                }
            }
        }
    }
}
