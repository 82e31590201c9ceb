use std::fs;

use screen_abstraction::{
    abstraction::resolver::{resolve_observation, ResolveMode},
    engine::{engine::Engine, error::EngineError},
    graph::{artifact::StaticArtifact, transition_model::RecordOutcome},
    model::{context::ModelContext, error::ModelError},
    observation::observation_model::{ActionKind, ConcreteWidget, ScreenFlags},
    refinement::rebuild::rebuild_window,
    report::console::format_console_report,
};
use serde_json::json;
use tempfile::TempDir;

use crate::common::{
    screens::{detail, home, list, main_screen, screen, settings},
    utils::{act, assert_closed, click, config, divergent_list_stream, engine, run, start},
};

mod common;

// =========================================================================
// Resolution
// =========================================================================

#[test]
fn resolution_is_idempotent() {
    let engine = engine();
    let outcomes = run(&engine, vec![start(list("Alpha"))]);
    let states = engine.with_context(|ctx| ctx.states.len());

    assert_eq!(engine.peek_state(&list("Alpha")), Some(outcomes[0].state));
    assert_eq!(engine.peek_state(&list("Alpha")), Some(outcomes[0].state));
    assert_eq!(engine.with_context(|ctx| ctx.states.len()), states, "peeking registers nothing");

    let again = run(&engine, vec![act(ActionKind::PressBack, list("Alpha"))]);
    assert_eq!(again[0].state, outcomes[0].state);
    assert!(!again[0].created_state);
}

#[test]
fn live_resolution_counts_visits() {
    let engine = engine();
    let outcomes = run(
        &engine,
        vec![
            start(home()),
            act(ActionKind::Launch, list("Alpha")),
            act(ActionKind::PressHome, home()),
            act(ActionKind::Launch, list("Alpha")),
        ],
    );
    let visits = |state| {
        engine.with_context(|ctx| {
            let window = ctx.states.get(state).unwrap().window;
            ctx.states.visit_count(state, window)
        })
    };
    assert_eq!(outcomes[1].state, outcomes[3].state);
    assert_eq!(visits(outcomes[1].state), 2);
    assert_eq!(visits(outcomes[0].state), 2, "home was resolved twice");
}

#[test]
fn rebuild_resolution_leaves_visits_alone() {
    let mut ctx = ModelContext::new(config());
    let observation = ctx.history.push_observation(list("Alpha"));
    let live = resolve_observation(&mut ctx, observation, ResolveMode::Live).unwrap();
    assert_eq!(ctx.states.visit_count(live.state, live.window), 1);

    let again = resolve_observation(&mut ctx, observation, ResolveMode::Rebuild).unwrap();
    assert_eq!(again.state, live.state);
    assert!(!again.created);
    assert_eq!(ctx.states.visit_count(live.state, live.window), 1);

    rebuild_window(&mut ctx, live.window).unwrap();
    assert_eq!(ctx.states.state_of(observation), Some(live.state));
    assert_eq!(ctx.states.visit_count(live.state, live.window), 1);
}

#[test]
fn same_stream_gives_same_hashes() {
    let hashes = |engine: &Engine| -> Vec<String> {
        run(engine, divergent_list_stream("Alpha", "Beta"))
            .into_iter()
            .map(|o| o.state_hash)
            .collect()
    };
    let first = hashes(&engine());
    let second = hashes(&engine());
    assert_eq!(first, second);
    assert!(first.iter().all(|h| !h.is_empty()));
}

#[test]
fn invisible_and_unclassified_widgets_do_not_matter() {
    let engine = engine();
    let plain = run(&engine, vec![start(list("Alpha"))]).remove(0);

    let mut noisy = list("Alpha");
    noisy.widgets.push(ConcreteWidget {
        index: 7,
        parent: Some(0),
        class_name: "android.widget.Button".into(),
        resource_id: Some("hidden".into()),
        clickable: true,
        visible: false,
        ..Default::default()
    });
    noisy.widgets.push(ConcreteWidget {
        index: 8,
        parent: Some(0),
        text: Some("orphan text".into()),
        ..Default::default()
    });
    assert_eq!(engine.peek_state(&noisy), Some(plain.state));
}

#[test]
fn out_of_scope_screens_share_one_state() {
    let engine = engine();
    let mut crash = main_screen();
    crash.flags = ScreenFlags {
        is_crash_dialog: true,
        ..Default::default()
    };
    let mut browser = screen("BrowserActivity", vec![]);
    browser.package = "com.android.chrome".into();
    let mut permission = screen("GrantPermissionsActivity", vec![]);
    permission.package = "com.android.permissioncontroller".into();

    let outcomes = run(
        &engine,
        vec![
            start(main_screen()),
            click(1, browser),
            act(ActionKind::PressBack, crash),
            act(ActionKind::PressBack, permission),
        ],
    );
    assert_ne!(outcomes[0].state, outcomes[1].state);
    assert_eq!(outcomes[1].state, outcomes[2].state);
    assert_eq!(outcomes[2].state, outcomes[3].state);
    engine.with_context(|ctx| {
        let state = ctx.states.get(outcomes[1].state).unwrap();
        assert!(state.flags.out_of_scope);
        assert!(state.keys.is_empty());
    });
}

#[test]
fn home_and_app_stopped_are_distinct_special_states() {
    let engine = engine();
    let mut stopped = home();
    stopped.flags = ScreenFlags {
        is_app_stopped: true,
        ..Default::default()
    };
    let outcomes = run(&engine, vec![start(home()), act(ActionKind::PressBack, stopped)]);
    assert_ne!(outcomes[0].state, outcomes[1].state);
    engine.with_context(|ctx| {
        assert!(ctx.states.get(outcomes[0].state).unwrap().flags.home);
        assert!(ctx.states.get(outcomes[1].state).unwrap().flags.app_stopped);
    });
}

// =========================================================================
// Reset anchor
// =========================================================================

#[test]
fn repeated_resets_reuse_the_anchor() {
    let engine = engine();
    let outcomes = run(
        &engine,
        vec![
            start(home()),
            act(ActionKind::Launch, main_screen()),
            click(1, detail("alpha_body")),
            act(ActionKind::Reset, main_screen()),
        ],
    );
    let main = outcomes[1].state;
    assert_eq!(outcomes[3].state, main);
    assert!(
        matches!(outcomes[3].transition, Some(RecordOutcome::Promoted(_))),
        "the implicit reset edge is confirmed, got {:?}",
        outcomes[3].transition
    );
    let states = engine.with_context(|ctx| ctx.states.len());

    let more = run(
        &engine,
        vec![click(1, detail("alpha_body")), act(ActionKind::Reset, main_screen())],
    );
    assert_eq!(more[1].state, main);
    assert!(matches!(more[1].transition, Some(RecordOutcome::Merged(_))));

    engine.with_context(|ctx| {
        assert_eq!(ctx.states.len(), states, "no new state per reset");
        assert_eq!(ctx.reset_anchor_state(), Some(main));
        for state in ctx.states.ids().into_iter().filter(|s| *s != main) {
            assert!(
                ctx.graph.outgoing(state).any(|t| t.is_reset() && t.destination == main),
                "{} has no reset edge to the anchor",
                state
            );
        }
        assert_closed(ctx);
    });
}

#[test]
fn new_anchor_replaces_stale_reset_edges() {
    let engine = engine();
    let outcomes = run(
        &engine,
        vec![
            start(home()),
            act(ActionKind::Launch, main_screen()),
            click(1, detail("alpha_body")),
            act(ActionKind::Reset, settings()),
        ],
    );
    let anchor = outcomes[3].state;
    engine.with_context(|ctx| {
        assert_eq!(ctx.reset_anchor_state(), Some(anchor));
        for t in ctx.graph.iter().filter(|t| t.implicit && t.is_reset()) {
            assert_eq!(t.destination, anchor, "stale reset edge {}", t.id);
        }
    });
}

// =========================================================================
// Static artifact
// =========================================================================

#[test]
fn repeated_input_declaration_is_a_hard_failure() {
    let artifact: StaticArtifact = serde_json::from_value(json!({
        "windows": [{
            "name": "Main",
            "kind": "Activity",
            "elements": [ { "key": "go", "className": "android.widget.Button", "resourceId": "go" } ],
            "inputs": [
                { "event": "Click", "element": "go" },
                { "event": "Click", "element": "go" }
            ]
        }]
    }))
    .unwrap();

    match Engine::with_artifact(config(), &artifact) {
        Err(EngineError::Model(ModelError::DuplicateInput { event, .. })) => {
            assert_eq!(event, ActionKind::Click)
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("duplicate input accepted"),
    }
}

// =========================================================================
// Trace and reporting
// =========================================================================

#[test]
fn trace_file_records_engine_events() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.jsonl");
    let mut config = config();
    config.trace_path = Some(path.display().to_string());

    let engine = Engine::new(config);
    run(&engine, divergent_list_stream("Alpha", "Beta"));

    let text = fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let kinds: Vec<&str> = events.iter().filter_map(|e| e["event"].as_str()).collect();
    for expected in [
        "state_created",
        "transition_recorded",
        "inconsistency_detected",
        "granularity_raised",
        "rebuild_finished",
    ] {
        assert!(kinds.contains(&expected), "missing {} in {:?}", expected, kinds);
    }
    assert!(events.iter().all(|e| e["step"].as_u64().is_some()));
}

#[test]
fn console_report_lists_raised_scopes() {
    let engine = engine();
    run(&engine, divergent_list_stream("Alpha", "Beta"));
    let summary = engine.summary();
    assert!(summary.refinement_rounds > 0);
    assert_eq!(summary.states, engine.with_context(|ctx| ctx.states.len()));

    let text = format_console_report(&summary);
    assert!(text.contains("=== Abstract Model ==="));
    assert!(text.contains("[RAISED]"));
    assert!(!text.contains("[NONDETERMINISTIC]"));
}

#[test]
fn summary_reports_unresolved_nondeterminism() {
    let engine = engine();
    run(&engine, divergent_list_stream("Same", "Same"));
    let summary = engine.summary();
    assert_eq!(summary.nondeterminism.len(), 1);
    assert_eq!(summary.guarded_transitions, 2);
    assert!(format_console_report(&summary).contains("[NONDETERMINISTIC]"));
}
