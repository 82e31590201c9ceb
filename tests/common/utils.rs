use screen_abstraction::engine::config::EngineConfig;
use screen_abstraction::engine::engine::{Engine, StepOutcome};
use screen_abstraction::model::context::ModelContext;
use screen_abstraction::observation::observation_model::{ActionKind, ConcreteObservation, Interaction, ObservedStep};

use crate::common::screens::{detail, home, list, APP};

pub fn config() -> EngineConfig {
    EngineConfig::for_package(APP)
}

pub fn engine() -> Engine {
    Engine::new(config())
}

pub fn start(obs: ConcreteObservation) -> ObservedStep {
    ObservedStep::initial(obs)
}

pub fn click(target: u32, obs: ConcreteObservation) -> ObservedStep {
    ObservedStep::after(Interaction::on(ActionKind::Click, target), obs)
}

pub fn act(kind: ActionKind, obs: ConcreteObservation) -> ObservedStep {
    ObservedStep::after(Interaction::new(kind), obs)
}

pub fn run(engine: &Engine, steps: Vec<ObservedStep>) -> Vec<StepOutcome> {
    engine.replay(steps).unwrap()
}

/// Two list screens that only differ by their title text, each opened once
/// from a fresh launch and leading to different detail screens.
pub fn divergent_list_stream(first: &str, second: &str) -> Vec<ObservedStep> {
    vec![
        start(home()),
        act(ActionKind::Launch, list(first)),
        click(2, detail("alpha_body")),
        act(ActionKind::PressHome, home()),
        act(ActionKind::Launch, list(second)),
        click(2, detail("beta_body")),
    ]
}

/// No transition references a state missing from the store.
pub fn assert_closed(ctx: &ModelContext) {
    for t in ctx.graph.iter() {
        assert!(ctx.states.contains(t.source), "dangling source in {}", t.id);
        assert!(ctx.states.contains(t.destination), "dangling destination in {}", t.id);
        for s in &t.evidence.dependent_states {
            assert!(ctx.states.contains(*s), "dangling dependent state {} in {}", s, t.id);
        }
    }
}
