//! Step execution with output classification.

use std::time::Instant;

use dailybuild_core::{
    drain, ErrorAggregator, ErrorRecord, ShellRunner, SignatureTable, Step, OUTPUT_TARGET,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::stage::StepInvocation;

/// Result of one step execution.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub step: Step,

    /// Project the step ran for.
    pub project: String,

    /// Every output line, in order.
    pub lines: Vec<String>,

    /// Records produced by this step, in the order they were appended.
    pub errors: Vec<ErrorRecord>,

    /// Whether the step's success marker appeared in the output.
    pub success_marker_seen: bool,

    /// `None` if the process never started or was killed by a signal.
    pub exit_code: Option<i32>,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl StageResult {
    /// Whether the step produced no error records.
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs a step and classifies each output line against the step's failure
/// signatures.
///
/// A failing step never stops anything: the output is always drained and
/// the caller decides what runs next.
pub struct StageRunner<'a> {
    shell: &'a dyn ShellRunner,
    signatures: &'a SignatureTable,
}

impl<'a> StageRunner<'a> {
    pub fn new(shell: &'a dyn ShellRunner, signatures: &'a SignatureTable) -> Self {
        Self { shell, signatures }
    }

    /// Execute `invocation` for `project`, appending one record per matching
    /// output line to `errors`.
    pub async fn run(
        &self,
        invocation: &StepInvocation,
        project: &str,
        errors: &mut ErrorAggregator,
    ) -> StageResult {
        let start = Instant::now();
        let step = invocation.step;
        let kind = step.error_kind();
        let set = self.signatures.get(step);

        info!(project = %project, step = %step, command = %invocation.command, "running step");

        let mut result = StageResult {
            step,
            project: project.to_string(),
            lines: Vec::new(),
            errors: Vec::new(),
            success_marker_seen: false,
            exit_code: None,
            duration_ms: 0,
        };

        let output = match self.shell.spawn(&invocation.to_shell_command()).await {
            Ok(output) => output,
            Err(e) => {
                let record = ErrorRecord::for_project(kind, project, format!("failed to start: {e}"));
                result.errors.push(record.clone());
                errors.record(record);
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };

        let exit_code = drain(output, |line| {
            info!(target: OUTPUT_TARGET, project = %project, step = %step, "{line}");
            if set.first_failure(line).is_some() {
                let record = ErrorRecord::for_project(kind, project, line);
                result.errors.push(record.clone());
                errors.record(record);
            }
            if set.is_success(line) {
                result.success_marker_seen = true;
            }
            result.lines.push(line.to_string());
        })
        .await;

        result.exit_code = exit_code;
        result.duration_ms = start.elapsed().as_millis() as u64;

        if exit_code != Some(0) {
            warn!(project = %project, step = %step, exit_code = ?exit_code, "step exited non-zero");
        }
        info!(
            project = %project,
            step = %step,
            passed = result.passed(),
            duration_ms = result.duration_ms,
            "step finished"
        );
        result
    }
}
