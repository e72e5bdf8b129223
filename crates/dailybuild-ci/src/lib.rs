//! dailybuild CI - the build orchestration pipeline
//!
//! Provides an orchestrator that:
//! - Checks every project for upstream changes, in dependency order
//! - Rebuilds changed projects while classifying command output
//! - Packages the application only when no error was recorded
//! - Uploads the artifact and reports the outcome

pub mod gate;
pub mod package;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod spec;
pub mod stage;

// Re-export key types
pub use gate::{GateVerdict, PackagingGate};
pub use package::{artifact_file_name, ArtifactDescriptor, ArtifactPackager, PackagingOutcome};
pub use pipeline::{Orchestrator, ProjectVisit, RunContext, RunPhase, RunReport};
pub use report::{NotificationEvent, ReportOutcome, UploadNotifier};
pub use runner::{StageResult, StageRunner};
pub use spec::RunPlan;
pub use stage::{build_steps, reset_build_dir, StepInvocation};
