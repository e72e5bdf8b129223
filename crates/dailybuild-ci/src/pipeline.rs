//! Build run orchestration.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use dailybuild_core::obs::{
    emit_gate_evaluated, emit_project_checked, emit_run_finished, emit_run_started,
    emit_run_warning, run_span,
};
use dailybuild_core::{
    ArtifactUploader, ErrorAggregator, ErrorKind, ErrorRecord, Notifier, PlatformProfile,
    ProjectSpec, ProjectState, RepositorySyncChecker, ShellRunner, SignatureTable, SyncStatus,
};
use futures::FutureExt;
use serde::Serialize;
use tracing::{info, Instrument};

use crate::gate::PackagingGate;
use crate::package::{ArtifactDescriptor, ArtifactPackager};
use crate::report::{NotificationEvent, UploadNotifier};
use crate::runner::{StageResult, StageRunner};
use crate::spec::RunPlan;
use crate::stage::{build_steps, reset_build_dir};

/// Everything one run needs. Created per invocation; nothing is global.
pub struct RunContext {
    pub profile: PlatformProfile,
    pub errors: ErrorAggregator,
    pub shell: Arc<dyn ShellRunner>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub uploader: Option<Arc<dyn ArtifactUploader>>,
    pub signatures: SignatureTable,
    /// Date stamped into the artifact name.
    pub today: NaiveDate,
}

impl RunContext {
    pub fn new(profile: PlatformProfile, shell: Arc<dyn ShellRunner>) -> Self {
        Self {
            profile,
            errors: ErrorAggregator::new(),
            shell,
            notifier: None,
            uploader: None,
            signatures: SignatureTable::standard(),
            today: Local::now().date_naive(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn ArtifactUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

/// Run-level phases, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    RunningProjects,
    PackagingGate,
    Packaging,
    Uploading,
    ReportingFailure,
    Done,
}

/// What happened to one project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectVisit {
    pub name: String,
    /// `None` when the check could not run.
    pub sync: Option<SyncStatus>,
    pub state: ProjectState,
    pub stages: Vec<StageResult>,
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub plan_digest: String,
    pub projects: Vec<ProjectVisit>,
    pub phases: Vec<RunPhase>,
    pub packaging_attempted: bool,
    pub artifact: Option<ArtifactDescriptor>,
    /// Full aggregator contents at the end of the run.
    pub errors: Vec<ErrorRecord>,
    pub notification: NotificationEvent,
    pub message: String,
    /// Non-fatal problems such as failed uploads.
    pub warnings: Vec<ErrorRecord>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of configure/compile/install steps started across all projects.
    pub fn build_steps_run(&self) -> usize {
        self.projects.iter().map(|p| p.stages.len()).sum()
    }

    pub fn sync_statuses(&self) -> Vec<(String, Option<SyncStatus>)> {
        self.projects
            .iter()
            .map(|p| (p.name.clone(), p.sync))
            .collect()
    }
}

#[derive(Default)]
struct RunTrace {
    projects: Vec<ProjectVisit>,
    phases: Vec<RunPhase>,
    packaging_attempted: bool,
}

/// Build run orchestrator.
pub struct Orchestrator;

impl Orchestrator {
    /// Execute one run: visit every project in order, package on a clean run,
    /// then upload and notify.
    ///
    /// Always returns a report. Unexpected failures, including panics, become a
    /// single `UnhandledError` record and skip straight to reporting.
    pub async fn run(ctx: RunContext) -> RunReport {
        let plan = RunPlan::from_profile(&ctx.profile);
        let run_id = RunPlan::new_run_id();
        let span = run_span(&run_id);
        Self::run_plan(ctx, plan, run_id).instrument(span).await
    }

    async fn run_plan(mut ctx: RunContext, plan: RunPlan, run_id: String) -> RunReport {
        let start = Instant::now();
        emit_run_started(&run_id, ctx.profile.platform.name(), plan.projects.len());

        let mut trace = RunTrace::default();
        let body = Self::build_and_package(&mut ctx, &mut trace, &run_id);
        let artifact = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(e)) => {
                ctx.errors.record(ErrorRecord::run_level(
                    ErrorKind::UnhandledError,
                    format!("{e:#}"),
                ));
                None
            }
            Err(panic) => {
                ctx.errors.record(ErrorRecord::run_level(
                    ErrorKind::UnhandledError,
                    format!("panic: {}", panic_message(panic.as_ref())),
                ));
                None
            }
        };

        if !ctx.errors.is_empty() {
            trace.phases.push(RunPhase::ReportingFailure);
        } else if artifact.is_some() {
            trace.phases.push(RunPhase::Uploading);
        }

        let reporter = UploadNotifier::new(ctx.profile.platform, &ctx.profile.upload)
            .with_notifier(ctx.notifier.as_deref())
            .with_uploader(ctx.uploader.as_deref());
        let outcome = reporter.report(&ctx.errors, artifact.as_ref()).await;
        for warning in &outcome.warnings {
            emit_run_warning(&run_id, warning);
        }
        trace.phases.push(RunPhase::Done);

        let duration_ms = start.elapsed().as_millis() as u64;
        emit_run_finished(&run_id, duration_ms, ctx.errors.len(), ctx.errors.is_empty());

        RunReport {
            run_id,
            plan_digest: plan.plan_digest,
            projects: trace.projects,
            phases: trace.phases,
            packaging_attempted: trace.packaging_attempted,
            artifact,
            errors: ctx.errors.snapshot().to_vec(),
            notification: outcome.event,
            message: outcome.message,
            warnings: outcome.warnings,
            duration_ms,
        }
    }

    async fn build_and_package(
        ctx: &mut RunContext,
        trace: &mut RunTrace,
        run_id: &str,
    ) -> anyhow::Result<Option<ArtifactDescriptor>> {
        trace.phases.push(RunPhase::RunningProjects);
        let projects = ctx.profile.projects.clone();
        for project in &projects {
            let visit = Self::visit(ctx, project).await?;
            emit_project_checked(run_id, &visit.name, visit.state);
            trace.projects.push(visit);
        }

        trace.phases.push(RunPhase::PackagingGate);
        let verdict = PackagingGate::evaluate(&ctx.errors);
        emit_gate_evaluated(run_id, verdict.violations.len(), verdict.passed);
        if !verdict.passed {
            info!("{}", verdict.message);
            return Ok(None);
        }

        let Some(recipe) = ctx.profile.packaging.as_ref() else {
            info!(platform = %ctx.profile.platform, "no packaging recipe for this platform");
            return Ok(None);
        };
        let app = ctx
            .profile
            .app_project()
            .with_context(|| format!("unknown application project {}", recipe.app_project))?;

        trace.phases.push(RunPhase::Packaging);
        trace.packaging_attempted = true;
        let packager = ArtifactPackager::new(
            ctx.shell.as_ref(),
            &ctx.signatures,
            recipe,
            app,
            ctx.today,
        );
        Ok(packager.package(&mut ctx.errors).await.artifact())
    }

    /// Walk one project through its state machine.
    async fn visit(ctx: &mut RunContext, project: &ProjectSpec) -> anyhow::Result<ProjectVisit> {
        let mut visit = ProjectVisit {
            name: project.name.clone(),
            sync: None,
            state: ProjectState::Checking,
            stages: Vec::new(),
        };

        let checker =
            RepositorySyncChecker::new(ctx.shell.as_ref(), &ctx.profile.commands, &ctx.signatures);
        visit.sync = checker.check(project, &mut ctx.errors).await.status();
        match visit.sync {
            None => {
                visit.state = ProjectState::Skipped;
                return Ok(visit);
            }
            Some(SyncStatus::UpToDate) => {
                visit.state = ProjectState::UpToDate;
                return Ok(visit);
            }
            Some(SyncStatus::UpdateAvailable) => {}
        }

        visit.state = ProjectState::Updating;
        if !checker.pull(project, &mut ctx.errors).await {
            visit.state = ProjectState::Skipped;
            return Ok(visit);
        }

        reset_build_dir(project)
            .await
            .with_context(|| format!("failed to reset build directory of {}", project.name))?;

        if project.is_packaging_only() {
            info!(project = %project.name, "skipping compilation");
            visit.state = ProjectState::Refreshed;
            return Ok(visit);
        }

        visit.state = ProjectState::Building;
        let runner = StageRunner::new(ctx.shell.as_ref(), &ctx.signatures);
        for invocation in build_steps(&ctx.profile.commands, project) {
            let result = runner.run(&invocation, &project.name, &mut ctx.errors).await;
            visit.stages.push(result);
        }
        visit.state = ProjectState::Installed;
        Ok(visit)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
