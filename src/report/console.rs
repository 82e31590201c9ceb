use crate::report::report_model::ModelSummary;

// ============================================================================
// Console reporter: formatted terminal output
// ============================================================================

/// Format a model summary for terminal output.
///
/// Produces output like:
/// ```text
/// === Abstract Model ===
///
/// Windows:      4 (3 active)
/// States:       7
/// Transitions:  12 (9 explicit, 3 implicit, 0 guarded)
///
/// Refinement: 2 rounds
///     [RAISED] Activity:Main FrameLayout/TextView#title -> Content
///
/// === 7 states from 15 observations ===
/// ```
pub fn format_console_report(summary: &ModelSummary) -> String {
    let mut out = String::new();

    out.push_str("=== Abstract Model ===\n\n");
    out.push_str(&format!(
        "Windows:      {} ({} active)\n",
        summary.windows, summary.active_windows
    ));
    out.push_str(&format!(
        "Elements:     {}\nInputs:       {} ({} with uncovered handlers)\n",
        summary.elements, summary.inputs, summary.inputs_with_uncovered_handlers
    ));
    out.push_str(&format!("States:       {}\n", summary.states));
    out.push_str(&format!(
        "Transitions:  {} ({} explicit, {} implicit, {} guarded)\n",
        summary.transitions,
        summary.explicit_transitions,
        summary.implicit_transitions,
        summary.guarded_transitions
    ));

    if !summary.states_per_window.is_empty() {
        out.push('\n');
        for (window, count) in summary.states_per_window.iter().take(10) {
            out.push_str(&format!("    {:>4}  {}\n", count, window));
        }
    }

    out.push_str(&format!("\nRefinement: {} rounds\n", summary.refinement_rounds));
    for scope in &summary.raised_scopes {
        out.push_str(&format!(
            "    [RAISED] {} {} -> {}\n",
            scope.window, scope.signature, scope.level
        ));
    }
    for report in &summary.nondeterminism {
        out.push_str(&format!("    [NONDETERMINISTIC] {}\n", report));
    }

    out.push_str(&format!(
        "\n=== {} states from {} observations ({} interactions) ===\n",
        summary.states, summary.observations, summary.interactions
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::report_model::RaisedScope;

    #[test]
    fn lists_raised_scopes_and_nondeterminism() {
        let summary = ModelSummary {
            states: 3,
            observations: 5,
            refinement_rounds: 1,
            raised_scopes: vec![RaisedScope {
                window: "Activity:Main".into(),
                signature: "FrameLayout/Button#ok".into(),
                level: "State".into(),
            }],
            nondeterminism: vec!["Click(Button#ok) from s0 -> {s1, s2}".into()],
            ..Default::default()
        };
        let out = format_console_report(&summary);
        assert!(out.contains("[RAISED] Activity:Main FrameLayout/Button#ok -> State"));
        assert!(out.contains("[NONDETERMINISTIC] Click(Button#ok)"));
        assert!(out.contains("=== 3 states from 5 observations"));
    }
}
