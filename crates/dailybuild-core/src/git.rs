//! Upstream change detection and working-copy updates.

use tracing::{debug, info, warn};

use crate::aggregator::ErrorAggregator;
use crate::error::{BuildError, ErrorRecord};
use crate::profile::CommandTemplates;
use crate::project::{ProjectSpec, SyncStatus};
use crate::shell::{drain, ShellCommand, ShellRunner};
use crate::signature::{SignatureTable, Step};
use crate::telemetry::OUTPUT_TARGET;

/// Result of checking one project against its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Checked(SyncStatus),
    /// The check could not run. A `SyncError` has been recorded.
    Skipped,
}

impl SyncOutcome {
    pub fn status(&self) -> Option<SyncStatus> {
        match self {
            SyncOutcome::Checked(status) => Some(*status),
            SyncOutcome::Skipped => None,
        }
    }
}

/// Runs the upstream check and pull commands for a project.
///
/// The check never mutates the working copy.
pub struct RepositorySyncChecker<'a> {
    shell: &'a dyn ShellRunner,
    commands: &'a CommandTemplates,
    signatures: &'a SignatureTable,
}

impl<'a> RepositorySyncChecker<'a> {
    pub fn new(
        shell: &'a dyn ShellRunner,
        commands: &'a CommandTemplates,
        signatures: &'a SignatureTable,
    ) -> Self {
        Self {
            shell,
            commands,
            signatures,
        }
    }

    /// Decide whether `project` has upstream changes.
    ///
    /// `UpToDate` iff the output contains the step's success marker. A missing
    /// working copy, a command that cannot start, or a non-zero exit without
    /// the marker skips the project.
    pub async fn check(
        &self,
        project: &ProjectSpec,
        errors: &mut ErrorAggregator,
    ) -> SyncOutcome {
        if !project.working_copy().is_dir() {
            let err = BuildError::MissingWorkingCopy(project.path.clone());
            errors.record(ErrorRecord::for_project(
                Step::SyncCheck.error_kind(),
                &project.name,
                err.to_string(),
            ));
            return SyncOutcome::Skipped;
        }

        let line = CommandTemplates::render(&self.commands.sync_check, project);
        let command = ShellCommand::new(line, project.working_copy());
        let output = match self.shell.spawn(&command).await {
            Ok(output) => output,
            Err(e) => {
                errors.record(ErrorRecord::for_project(
                    Step::SyncCheck.error_kind(),
                    &project.name,
                    format!("failed to start: {e}"),
                ));
                return SyncOutcome::Skipped;
            }
        };

        let set = self.signatures.get(Step::SyncCheck);
        let mut up_to_date = false;
        let mut last_line = None;
        let exit_code = drain(output, |line| {
            info!(target: OUTPUT_TARGET, project = %project.name, "{line}");
            if set.is_success(line) {
                up_to_date = true;
            }
            if !line.trim().is_empty() {
                last_line = Some(line.trim().to_string());
            }
        })
        .await;
        debug!(project = %project.name, exit_code = ?exit_code, up_to_date, "sync check finished");

        if up_to_date {
            return SyncOutcome::Checked(SyncStatus::UpToDate);
        }
        if exit_code != Some(0) {
            warn!(project = %project.name, exit_code = ?exit_code, "sync check failed");
            errors.record(ErrorRecord::for_project(
                Step::SyncCheck.error_kind(),
                &project.name,
                exit_failure("upstream check", exit_code, last_line.as_deref()),
            ));
            return SyncOutcome::Skipped;
        }
        SyncOutcome::Checked(SyncStatus::UpdateAvailable)
    }

    /// Pull upstream changes into the working copy.
    ///
    /// Returns `false` when the pull could not be started or exited non-zero;
    /// a `SyncError` has then been recorded.
    pub async fn pull(&self, project: &ProjectSpec, errors: &mut ErrorAggregator) -> bool {
        let line = CommandTemplates::render(&self.commands.pull, project);
        info!(project = %project.name, command = %line, "pulling");
        let command = ShellCommand::new(line, project.working_copy());
        let output = match self.shell.spawn(&command).await {
            Ok(output) => output,
            Err(e) => {
                errors.record(ErrorRecord::for_project(
                    Step::Pull.error_kind(),
                    &project.name,
                    format!("failed to start: {e}"),
                ));
                return false;
            }
        };

        let set = self.signatures.get(Step::Pull);
        let mut matched = Vec::new();
        let mut last_line = None;
        let exit_code = drain(output, |line| {
            info!(target: OUTPUT_TARGET, project = %project.name, "{line}");
            if set.first_failure(line).is_some() {
                matched.push(line.to_string());
            }
            if !line.trim().is_empty() {
                last_line = Some(line.trim().to_string());
            }
        })
        .await;
        let failed = exit_code != Some(0);
        if failed {
            warn!(project = %project.name, exit_code = ?exit_code, "pull exited non-zero");
            if matched.is_empty() {
                matched.push(exit_failure("pull", exit_code, last_line.as_deref()));
            }
        }
        for line in matched {
            errors.record(ErrorRecord::for_project(
                Step::Pull.error_kind(),
                &project.name,
                line,
            ));
        }
        !failed
    }
}

fn exit_failure(what: &str, exit_code: Option<i32>, last_line: Option<&str>) -> String {
    let status = match exit_code {
        Some(code) => format!("{what} exited with status {code}"),
        None => format!("{what} was terminated by a signal"),
    };
    match last_line {
        Some(line) => format!("{status}: {line}"),
        None => status,
    }
}
