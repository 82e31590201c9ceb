use std::path::Path;

use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;

use crate::abstraction::resolver::{peek_state, resolve_observation, ResolveMode};
use crate::engine::config::EngineConfig;
use crate::engine::error::{EngineError, Result};
use crate::graph::artifact::{load_static_artifact, ArtifactSummary, StaticArtifact};
use crate::graph::recorder::derive_transition;
use crate::graph::template::refresh_reset_anchor;
use crate::graph::transition_model::RecordOutcome;
use crate::model::context::ModelContext;
use crate::model::ids::{ObservationId, StateId};
use crate::observation::observation_model::{ConcreteObservation, ObservedStep};
use crate::persist::dump::{dump_model, DumpSummary};
use crate::persist::load::{load_model, LoadReport};
use crate::planner::path::TransitionPath;
use crate::planner::planner::{find_paths, find_paths_relaxed, Goal, PathConstraints, Relaxation};
use crate::refinement::controller::{NondeterminismReport, RefinementController, RefinementOutcome};
use crate::refinement::rebuild::collect_garbage;
use crate::report::report_model::ModelSummary;
use crate::trace::logger::TraceLogger;

/// Trace states offered to the planner as guard context.
const GUARD_HISTORY: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub observation: ObservationId,
    pub state: StateId,
    pub state_hash: String,
    pub created_state: bool,
    pub transition: Option<RecordOutcome>,
    pub refinement: Option<RefinementOutcome>,
}

struct EngineInner {
    ctx: ModelContext,
    refinement: RefinementController,
    step: u64,
}

/// Online abstraction engine. Observations are processed one at a time
/// under the write lock; planning queries share the read lock.
pub struct Engine {
    inner: RwLock<EngineInner>,
    tracer: TraceLogger,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let tracer = match config.trace_path.as_deref() {
            Some(path) => TraceLogger::new(path),
            None => TraceLogger::disabled(),
        };
        Self {
            inner: RwLock::new(EngineInner {
                ctx: ModelContext::new(config),
                refinement: RefinementController::new(),
                step: 0,
            }),
            tracer,
        }
    }

    pub fn with_artifact(config: EngineConfig, artifact: &StaticArtifact) -> Result<Self> {
        let engine = Self::new(config);
        engine.load_static(artifact)?;
        Ok(engine)
    }

    pub fn load_static(&self, artifact: &StaticArtifact) -> Result<ArtifactSummary> {
        let mut inner = self.inner.write();
        Ok(load_static_artifact(&mut inner.ctx, artifact)?)
    }

    pub fn load_model(&self, dir: &Path) -> Result<LoadReport> {
        let mut inner = self.inner.write();
        Ok(load_model(&mut inner.ctx, dir)?)
    }

    pub fn dump_model(&self, dir: &Path) -> Result<DumpSummary> {
        let inner = self.inner.read();
        Ok(dump_model(&inner.ctx, dir)?)
    }

    /// Process one observed step: resolve, record, validate and refine.
    pub fn step(&self, step: ObservedStep) -> Result<StepOutcome> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.step += 1;
        let ctx = &mut inner.ctx;

        let previous = ctx.history.last_observation();
        let observation = ctx.history.push_observation(step.observation);
        let resolution = resolve_observation(ctx, observation, ResolveMode::Live)?;

        let mut transition = None;
        let mut refinement = None;
        if let (Some(interaction), Some(source)) = (step.interaction, previous) {
            let is_reset = interaction.kind.is_reset();
            let source_window = ctx.history.window_of(source);
            let prior_window = source_window.and_then(|current| {
                let windows = &ctx.windows;
                ctx.history
                    .prior_window(source, windows.active(current), |w| windows.active(w))
            });
            let record = ctx
                .history
                .push_interaction(interaction, source, observation, prior_window, step.coverage)
                .clone();
            let id = record.id;
            transition = derive_transition(ctx, &record, false)?;

            if is_reset {
                ctx.reset_anchor = Some(observation);
                refresh_reset_anchor(ctx)?;
            }
            if ctx.states.get(resolution.state).is_some_and(|s| s.flags.home) {
                collect_garbage(ctx);
            }
            refinement = inner.refinement.after_record(ctx, id)?;
        }

        // Refinement may have re-resolved this observation.
        let state = ctx.states.state_of(observation).ok_or(EngineError::NoCurrentState)?;
        let state_hash = ctx
            .states
            .get(state)
            .map(|s| s.hash.clone())
            .unwrap_or_default();
        debug!("step {}: {} -> {}", inner.step, observation, state);

        let events = ctx.drain_events();
        let step_number = inner.step;
        let outcome = StepOutcome {
            observation,
            state,
            state_hash,
            created_state: resolution.created,
            transition,
            refinement,
        };
        drop(guard);

        // File writes happen outside the model lock.
        self.tracer.record_step(step_number, events);
        Ok(outcome)
    }

    /// Feed a whole stream; stops at the first hard failure.
    pub fn replay<I>(&self, steps: I) -> Result<Vec<StepOutcome>>
    where
        I: IntoIterator<Item = ObservedStep>,
    {
        let outcomes = steps
            .into_iter()
            .map(|s| self.step(s))
            .collect::<Result<Vec<_>>>()?;
        info!("replayed {} steps", outcomes.len());
        Ok(outcomes)
    }

    pub fn current_state(&self) -> Option<StateId> {
        self.inner.read().ctx.current_state()
    }

    /// State the observation would resolve to right now, without recording it.
    pub fn peek_state(&self, observation: &ConcreteObservation) -> Option<StateId> {
        peek_state(&self.inner.read().ctx, observation)
    }

    pub fn find_paths(&self, from: StateId, goal: &Goal, constraints: &PathConstraints) -> Vec<TransitionPath> {
        let inner = self.inner.read();
        let history = inner.ctx.recent_states(GUARD_HISTORY);
        find_paths(&inner.ctx, from, goal, constraints, &history)
    }

    pub fn find_paths_relaxed(
        &self,
        from: StateId,
        goal: &Goal,
        constraints: &PathConstraints,
    ) -> (Vec<TransitionPath>, Relaxation) {
        let inner = self.inner.read();
        let history = inner.ctx.recent_states(GUARD_HISTORY);
        find_paths_relaxed(&inner.ctx, from, goal, constraints, &history)
    }

    pub fn reports(&self) -> Vec<NondeterminismReport> {
        self.inner.read().refinement.reports().to_vec()
    }

    pub fn summary(&self) -> ModelSummary {
        let inner = self.inner.read();
        ModelSummary::from_context(&inner.ctx, &inner.refinement)
    }

    /// Read-only access to the model for inspection and reporting.
    pub fn with_context<R>(&self, f: impl FnOnce(&ModelContext) -> R) -> R {
        f(&self.inner.read().ctx)
    }
}
