//! Structured observability hooks for build run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for key lifecycle events: start, project checked,
//!   packaging gate, finish
//!
//! Events are emitted at `info!` level. For JSON output pass `--json` to the
//! binary.

use tracing::info;

use crate::project::ProjectState;

/// Run-scoped span tagging every event with `run_id`.
///
/// # Example
///
/// ```ignore
/// use tracing::Instrument;
/// orchestrate().instrument(run_span("3f0c...")).await;
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("dailybuild.run", run_id = %run_id)
}

/// Emit event: run started on `platform` with `projects` in the plan.
pub fn emit_run_started(run_id: &str, platform: &str, projects: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        platform = %platform,
        projects = projects,
    );
}

/// Emit event: a project reached a terminal state.
pub fn emit_project_checked(run_id: &str, project: &str, state: ProjectState) {
    debug_assert!(
        state.is_terminal(),
        "{project} reported in non-terminal state {state:?}"
    );
    info!(
        event = "project.checked",
        run_id = %run_id,
        project = %project,
        state = ?state,
    );
}

/// Emit event: packaging gate evaluated.
pub fn emit_gate_evaluated(run_id: &str, error_count: usize, open: bool) {
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        error_count = error_count,
        open = open,
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, error_count: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        error_count = error_count,
        success = success,
    );
}

/// Emit event: a non-fatal problem that does not affect the outcome.
pub fn emit_run_warning(run_id: &str, warning: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.warning", run_id = %run_id, warning = %warning);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
    }

    #[traced_test]
    #[test]
    fn test_lifecycle_events_are_logged() {
        emit_run_started("r1", "Linux", 3);
        emit_project_checked("r1", "libopenshot", ProjectState::UpToDate);
        emit_gate_evaluated("r1", 0, true);
        emit_run_finished("r1", 12, 0, true);

        assert!(logs_contain("run.started"));
        assert!(logs_contain("project.checked"));
        assert!(logs_contain("gate.evaluated"));
        assert!(logs_contain("run.finished"));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "non-terminal state Building")]
    fn test_project_checked_requires_terminal_state() {
        emit_project_checked("r1", "libopenshot", ProjectState::Building);
    }
}
