use std::collections::{BTreeMap, BTreeSet};

use screen_abstraction::{
    abstraction::{
        abstract_state::{AbstractAction, StateFlags, StateSignature},
        reducer::static_key,
    },
    engine::{config::EngineConfig, engine::Engine},
    graph::transition_model::TransitionRecord,
    model::{
        context::ModelContext,
        ids::{StateId, WindowId},
    },
    observation::observation_model::ActionKind,
    planner::planner::{find_paths, find_paths_relaxed, Goal, PathConstraints, Relaxation},
};

use crate::common::{
    screens::{detail, home, main_screen},
    utils::{act, assert_closed, click, engine, run, start},
};

mod common;

// =========================================================================
// Helpers
// =========================================================================

/// Home, launch into Main, click through to a detail screen.
fn launched() -> (Engine, StateId, StateId, StateId) {
    let engine = engine();
    let outcomes = run(
        &engine,
        vec![
            start(home()),
            act(ActionKind::Launch, main_screen()),
            click(1, detail("alpha_body")),
        ],
    );
    (engine, outcomes[0].state, outcomes[1].state, outcomes[2].state)
}

fn bare_state(ctx: &mut ModelContext, name: &str) -> StateId {
    let signature = StateSignature {
        window: WindowId(0),
        keys: [static_key("android.widget.TextView", Some(name))].into_iter().collect(),
        flags: StateFlags::default(),
    };
    ctx.states.get_or_create(signature, BTreeMap::new(), name.to_string()).0
}

fn button_click(name: &str) -> AbstractAction {
    AbstractAction::on(ActionKind::Click, static_key("android.widget.Button", Some(name)))
}

fn link(ctx: &mut ModelContext, source: StateId, name: &str, destination: StateId, dependent: Option<StateId>) {
    traverse(ctx, source, button_click(name), destination, dependent);
}

fn traverse(
    ctx: &mut ModelContext,
    source: StateId,
    action: AbstractAction,
    destination: StateId,
    dependent: Option<StateId>,
) {
    let record = TransitionRecord {
        source,
        action,
        destination,
        prior_window: None,
        interaction: None,
        input: None,
        coverage: BTreeSet::new(),
        new_coverage: false,
        dependent_state: dependent,
        replay: false,
    };
    ctx.graph.record_transition(&mut ctx.inputs, record).unwrap();
}

// =========================================================================
// Reset edges
// =========================================================================

#[test]
fn reset_edges_need_permission() {
    let (engine, _, main, opened) = launched();

    let strict = engine.find_paths(opened, &Goal::State(main), &PathConstraints::default());
    assert!(strict.is_empty(), "only a reset leads back to main");

    let paths = engine.find_paths(
        opened,
        &Goal::State(main),
        &PathConstraints::default().allow_reset(true),
    );
    assert_eq!(paths.len(), 1);
    let path = &paths[0];
    assert_eq!(path.reset_steps(), 1);
    assert_eq!(path.cost, EngineConfig::default().planner.reset_weight);
}

#[test]
fn max_cost_prunes_expensive_paths() {
    let (engine, _, main, opened) = launched();
    let mut constraints = PathConstraints::default().allow_reset(true);
    constraints.max_cost = Some(4);
    assert!(engine.find_paths(opened, &Goal::State(main), &constraints).is_empty());
}

// =========================================================================
// Path shape
// =========================================================================

#[test]
fn paths_are_walks_with_summed_weights() {
    let (engine, home, _, opened) = launched();
    let paths = engine.find_paths(
        home,
        &Goal::State(opened),
        &PathConstraints::default().allow_reset(true),
    );
    assert!(!paths.is_empty());

    engine.with_context(|ctx| {
        assert_closed(ctx);
        let weights = &ctx.config.planner;
        for path in &paths {
            assert!(path.is_walk_in(&ctx.graph), "{:?}", path.steps);
            let sum: u32 = path.steps.iter().map(|s| s.weight).sum();
            assert_eq!(path.cost, sum);
            let visited: BTreeSet<_> = path.steps.iter().map(|s| s.source).collect();
            assert_eq!(visited.len(), path.len(), "paths never revisit a state");
        }
        // Launch from home, then the explicit click.
        assert_eq!(paths[0].cost, weights.reset_weight + weights.explicit_weight);
    });

    for pair in paths.windows(2) {
        assert!(pair[0].cost <= pair[1].cost, "results come cheapest first");
    }
}

#[test]
fn satisfied_goal_yields_one_empty_path() {
    let (engine, _, main, _) = launched();
    let paths = engine.find_paths(main, &Goal::State(main), &PathConstraints::default());
    assert_eq!(paths.len(), 1);
    assert!(paths[0].is_empty());
    assert_eq!(paths[0].cost, 0);
}

#[test]
fn window_goal_matches_any_state_of_the_window() {
    let (engine, _, main, opened) = launched();
    let window = engine.with_context(|ctx| ctx.states.get(opened).map(|s| s.window)).unwrap();
    let paths = engine.find_paths(main, &Goal::Window(window), &PathConstraints::default());
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].destination, opened);
    assert_eq!(paths[0].cost, 1);
}

// =========================================================================
// Ordering at equal cost
// =========================================================================

#[test]
fn equal_cost_prefers_explicit_edges() {
    let mut ctx = ModelContext::new(EngineConfig::default());
    let from = bare_state(&mut ctx, "from");
    let middle = bare_state(&mut ctx, "middle");
    let to = bare_state(&mut ctx, "to");

    ctx.graph.add_implicit(from, button_click("shortcut"), to, None).unwrap();
    link(&mut ctx, from, "first", middle, None);
    link(&mut ctx, middle, "second", to, None);

    let paths = find_paths(&ctx, from, &Goal::State(to), &PathConstraints::default(), &[]);
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].cost, paths[1].cost, "one implicit edge weighs two explicit ones");
    assert_eq!(paths[0].implicit_steps(), 0);
    assert_eq!(paths[0].len(), 2);
    assert_eq!(paths[1].implicit_steps(), 1);
}

#[test]
fn equal_cost_prefers_fewer_resets() {
    let mut ctx = ModelContext::new(EngineConfig::default());
    let weights = ctx.config.planner.clone();
    let from = bare_state(&mut ctx, "from");
    let to = bare_state(&mut ctx, "to");

    traverse(&mut ctx, from, AbstractAction::window_level(ActionKind::Launch), to, None);
    let mut at = from;
    for i in 1..weights.reset_weight {
        let next = bare_state(&mut ctx, &format!("hop{}", i));
        link(&mut ctx, at, &format!("hop{}", i), next, None);
        at = next;
    }
    link(&mut ctx, at, "last", to, None);

    let constraints = PathConstraints::default().allow_reset(true);
    let paths = find_paths(&ctx, from, &Goal::State(to), &constraints, &[]);
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].cost, weights.reset_weight);
    assert_eq!(paths[1].cost, weights.reset_weight);
    assert_eq!(paths[0].reset_steps(), 0, "the explicit chain ties with the reset and wins");
    assert_eq!(paths[1].reset_steps(), 1);
}

// =========================================================================
// Relaxation
// =========================================================================

#[test]
fn relaxation_falls_back_to_reset_for_action_goals() {
    let (engine, _, main, opened) = launched();
    let action = engine.with_context(|ctx| {
        ctx.graph
            .outgoing(main)
            .find(|t| t.destination == opened)
            .map(|t| t.action.clone())
            .expect("click edge recorded")
    });

    let (paths, relaxation) =
        engine.find_paths_relaxed(opened, &Goal::Action(action), &PathConstraints::default());
    assert_eq!(relaxation, Relaxation::AllowReset);
    assert_eq!(paths[0].destination, main);
}

#[test]
fn relaxation_accepts_another_action_on_the_target_element() {
    let mut ctx = ModelContext::new(EngineConfig::default());
    let from = bare_state(&mut ctx, "from");
    let to = bare_state(&mut ctx, "to");
    link(&mut ctx, from, "open", to, None);
    ctx.states.get_mut(to).unwrap().actions.insert(button_click("go"));

    let goal = Goal::Action(AbstractAction::on(
        ActionKind::LongClick,
        static_key("android.widget.Button", Some("go")),
    ));
    let (paths, relaxation) = find_paths_relaxed(&ctx, from, &goal, &PathConstraints::default(), &[]);
    assert_eq!(relaxation, Relaxation::AnyActionOnTarget);
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].destination, to);

    let (paths, relaxation) = find_paths_relaxed(
        &ctx,
        from,
        &Goal::Action(AbstractAction::window_level(ActionKind::LongClick)),
        &PathConstraints::default(),
        &[],
    );
    assert!(paths.is_empty());
    assert_eq!(relaxation, Relaxation::Exhausted, "untargeted goals skip the last step");
}

#[test]
fn unreachable_goal_exhausts_relaxation() {
    let (engine, _, main, _) = launched();
    let (paths, relaxation) =
        engine.find_paths_relaxed(main, &Goal::State(StateId(9_999)), &PathConstraints::default());
    assert!(paths.is_empty());
    assert_eq!(relaxation, Relaxation::Exhausted);
}

// =========================================================================
// Execution helpers
// =========================================================================

#[test]
fn cursor_walks_steps_and_checks_screens() {
    let (engine, _, main, opened) = launched();
    let mut path = engine
        .find_paths(main, &Goal::State(opened), &PathConstraints::default())
        .remove(0);

    engine.with_context(|ctx| {
        assert!(path.can_continue_from(ctx, &main_screen()));
        assert!(!path.can_continue_from(ctx, &detail("alpha_body")), "wrong window");

        let mut without_button = main_screen();
        without_button.widgets.retain(|w| w.index != 1);
        assert!(!path.can_continue_from(ctx, &without_button), "target widget missing");
    });

    assert_eq!(path.position(), 0);
    assert!(path.next().is_some());
    assert!(path.next().is_none());
    path.reset();
    assert_eq!(path.peek().map(|s| s.destination), Some(opened));
}

// =========================================================================
// Guards
// =========================================================================

#[test]
fn guarded_edge_needs_its_dependent_state_in_the_prefix() {
    let mut ctx = ModelContext::new(EngineConfig::default());
    let entry = bare_state(&mut ctx, "entry");
    let other = bare_state(&mut ctx, "other");
    let from = bare_state(&mut ctx, "from");
    let to = bare_state(&mut ctx, "to");

    link(&mut ctx, entry, "enter", from, None);
    link(&mut ctx, other, "detour", from, None);
    link(&mut ctx, from, "go", to, Some(entry));
    let guarded: Vec<_> = ctx.graph.outgoing(from).map(|t| t.id).collect();
    ctx.graph.mark_guarded(&guarded);

    let constraints = PathConstraints::default();
    assert!(find_paths(&ctx, from, &Goal::State(to), &constraints, &[]).is_empty());
    assert!(find_paths(&ctx, from, &Goal::State(to), &constraints, &[other]).is_empty());
    assert_eq!(find_paths(&ctx, from, &Goal::State(to), &constraints, &[entry]).len(), 1);

    let through = find_paths(&ctx, entry, &Goal::State(to), &constraints, &[]);
    assert_eq!(through.len(), 1, "the path prefix itself satisfies the guard");
    assert_eq!(through[0].len(), 2);
}

#[test]
fn guard_satisfying_prefix_is_kept_when_a_cheaper_one_reaches_first() {
    let mut ctx = ModelContext::new(EngineConfig::default());
    let start = bare_state(&mut ctx, "start");
    let needed = bare_state(&mut ctx, "needed");
    let junction = bare_state(&mut ctx, "junction");
    let goal = bare_state(&mut ctx, "goal");

    link(&mut ctx, start, "direct", junction, None);
    link(&mut ctx, start, "around", needed, None);
    link(&mut ctx, needed, "join", junction, None);
    link(&mut ctx, junction, "finish", goal, Some(needed));
    let guarded: Vec<_> = ctx.graph.outgoing(junction).map(|t| t.id).collect();
    ctx.graph.mark_guarded(&guarded);

    let mut constraints = PathConstraints::default();
    constraints.max_results = 1;
    let paths = find_paths(&ctx, start, &Goal::State(goal), &constraints, &[]);
    assert_eq!(paths.len(), 1, "the direct prefix must not use up the junction");
    let visited: Vec<_> = paths[0].steps.iter().map(|s| s.destination).collect();
    assert_eq!(visited, vec![needed, junction, goal]);
}
