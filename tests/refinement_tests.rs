use std::collections::BTreeMap;

use screen_abstraction::{
    abstraction::{granularity::GranularityScope, reducer::GranularityLevel},
    graph::transition_model::RecordOutcome,
    observation::observation_model::ActionKind,
    refinement::controller::RefinementController,
};

use crate::common::{
    screens::{detail, home, list, list_with_sub},
    utils::{act, assert_closed, click, divergent_list_stream, engine, run},
};

mod common;

// =========================================================================
// Conflict resolution by raising granularity
// =========================================================================

#[test]
fn text_only_difference_merges_until_destinations_disagree() {
    let engine = engine();
    let steps = divergent_list_stream("Alpha", "Beta");
    let (head, tail) = steps.split_at(5);

    let outcomes = run(&engine, head.to_vec());
    assert_eq!(
        outcomes[1].state, outcomes[4].state,
        "lists differing only by title text share a state at structure level"
    );
    assert!(outcomes.iter().all(|o| o.refinement.is_none()));

    let last = run(&engine, tail.to_vec()).remove(0);
    let refinement = last.refinement.expect("diverging click triggers refinement");
    assert!(!refinement.exhausted, "title text separates the two lists");
    assert!(refinement.rounds >= 1);
    assert!(!refinement.rebuilds.is_empty());

    let (first, second) = engine.with_context(|ctx| {
        (
            ctx.states.state_of(outcomes[1].observation),
            ctx.states.state_of(outcomes[4].observation),
        )
    });
    assert!(first.is_some() && second.is_some());
    assert_ne!(first, second, "lists are split after refinement");
    assert!(engine.reports().is_empty());
}

#[test]
fn acted_on_element_is_raised_before_other_widgets() {
    let engine = engine();
    let outcomes = run(&engine, divergent_list_stream("Alpha", "Beta"));
    let refinement = outcomes[5].refinement.clone().expect("refinement ran");

    let first = &refinement.raised[0];
    assert!(
        first.scope.signature.ends_with("Button#open"),
        "first raise targets the clicked button, got {}",
        first.scope.signature
    );

    engine.with_context(|ctx| {
        let list_window = ctx
            .windows
            .find_by_class("List")
            .expect("list window registered");
        let title = ctx
            .granularity
            .level(&GranularityScope::new(list_window, "FrameLayout/TextView#title"));
        assert!(
            title >= GranularityLevel::Content,
            "title must reach content level to separate the lists, got {:?}",
            title
        );
    });
}

#[test]
fn granularity_only_grows() {
    let engine = engine();
    run(&engine, divergent_list_stream("Alpha", "Beta"));

    engine.with_context(|ctx| {
        let mut last: BTreeMap<GranularityScope, GranularityLevel> = BTreeMap::new();
        for raise in ctx.granularity.raises() {
            assert!(raise.to > raise.from, "{:?}", raise);
            let previous = last.get(&raise.scope).copied().unwrap_or_default();
            assert_eq!(raise.from, previous, "raises of one scope chain without gaps");
            last.insert(raise.scope.clone(), raise.to);
        }
        for (scope, level) in &last {
            assert_eq!(ctx.granularity.level(scope), *level);
        }
    });
}

#[test]
fn graph_stays_closed_after_rebuilds() {
    let engine = engine();
    run(&engine, divergent_list_stream("Alpha", "Beta"));
    engine.with_context(|ctx| {
        assert_closed(ctx);
        for state in ctx.states.iter() {
            for obs in &state.observations {
                assert_eq!(ctx.states.state_of(*obs), Some(state.id));
            }
        }
    });
}

#[test]
fn resolved_conflict_leaves_consistent_interactions() {
    let engine = engine();
    run(&engine, divergent_list_stream("Alpha", "Beta"));
    engine.with_context(|ctx| {
        for record in ctx.history.interactions() {
            assert!(
                RefinementController::is_consistent(ctx, record.id),
                "interaction {} still conflicts",
                record.id
            );
        }
    });
}

#[test]
fn replayed_evidence_keeps_every_interaction() {
    let engine = engine();
    run(&engine, divergent_list_stream("Alpha", "Beta"));
    engine.with_context(|ctx| {
        let mut recorded: Vec<_> = ctx
            .graph
            .iter()
            .flat_map(|t| t.evidence.interactions.iter().copied())
            .collect();
        recorded.sort();
        let expected: Vec<_> = ctx.history.interactions().iter().map(|r| r.id).collect();
        assert_eq!(recorded, expected, "each interaction backs exactly one transition");
    });
}

// =========================================================================
// Exhaustion
// =========================================================================

#[test]
fn identical_sources_exhaust_refinement_and_guard_edges() {
    let engine = engine();
    let outcomes = run(&engine, divergent_list_stream("Same", "Same"));

    let refinement = outcomes[5].refinement.clone().expect("refinement ran");
    assert!(refinement.exhausted, "identical screens cannot be separated");
    assert!(refinement.rounds <= engine.with_context(|ctx| ctx.config.refinement.max_rounds));

    let reports = engine.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].destinations.len(), 2);

    engine.with_context(|ctx| {
        for id in &reports[0].transitions {
            let t = ctx.graph.get(*id).expect("reported transition exists");
            assert!(t.guarded, "{} should be guarded", id);
            assert!(!t.evidence.dependent_states.is_empty());
        }
        assert_eq!(
            ctx.states.state_of(outcomes[1].observation),
            ctx.states.state_of(outcomes[4].observation)
        );
        assert_closed(ctx);
    });
}

#[test]
fn guarded_conflict_is_not_refined_again() {
    let engine = engine();
    run(&engine, divergent_list_stream("Same", "Same"));
    let rounds = engine.summary().refinement_rounds;

    // Same source, action and prior window as the guarded pair.
    let again = run(
        &engine,
        vec![
            act(ActionKind::PressHome, home()),
            act(ActionKind::Launch, list("Same")),
            click(2, detail("alpha_body")),
        ],
    );
    let last = &again[2];
    assert!(last.refinement.is_none());
    assert!(matches!(last.transition, Some(RecordOutcome::Merged(_))));
    engine.with_context(|ctx| {
        let t = last.transition.map(|o| o.transition()).expect("click recorded");
        assert!(ctx.graph.get(t).is_some_and(|t| t.guarded));
    });
    assert_eq!(engine.summary().refinement_rounds, rounds);
    assert_eq!(engine.reports().len(), 1);
}

#[test]
fn guards_and_reports_survive_a_later_rebuild_of_the_window() {
    let engine = engine();
    run(&engine, divergent_list_stream("Same", "Same"));
    let guarded_before = engine.summary().guarded_transitions;
    assert_eq!(guarded_before, 2);

    // A second, separable conflict in the same window forces rebuilds.
    let outcomes = run(
        &engine,
        vec![
            act(ActionKind::PressBack, list_with_sub("Same", "One")),
            click(2, detail("gamma_body")),
            act(ActionKind::PressBack, list_with_sub("Same", "Two")),
            click(2, detail("delta_body")),
        ],
    );
    let refinement = outcomes[3].refinement.clone().expect("second conflict is refined");
    assert!(!refinement.exhausted, "subtitle text separates the lists");
    assert!(!refinement.rebuilds.is_empty());
    assert!(refinement.rebuilds.iter().all(|r| r.guarded == guarded_before));

    let reports = engine.reports();
    assert_eq!(reports.len(), 1);
    engine.with_context(|ctx| {
        assert_eq!(ctx.graph.iter().filter(|t| t.guarded).count(), guarded_before);
        for id in &reports[0].transitions {
            let t = ctx.graph.get(*id).expect("reported transition survives the rebuild");
            assert!(t.guarded, "{} lost its guard", id);
        }
        assert_closed(ctx);
    });
}
