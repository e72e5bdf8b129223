//! dailybuild core library
//!
//! Project model, platform profiles, output signatures, error aggregation and
//! the shell/publishing seams shared by the pipeline and the binary.

pub mod aggregator;
pub mod error;
pub mod fakes;
pub mod git;
pub mod obs;
pub mod profile;
pub mod project;
pub mod publish;
pub mod shell;
pub mod signature;
pub mod telemetry;

pub use aggregator::{render_failure, ErrorAggregator};
pub use error::{BuildError, ErrorKind, ErrorRecord, Result};
pub use git::{RepositorySyncChecker, SyncOutcome};
pub use profile::{
    default_apps_root, CommandTemplates, NotifyTarget, PackagingRecipe, Platform,
    PlatformProfile, ShellConfig, TemplateCopy, UploadTarget, VersionSource, APPS_ROOT_ENV,
};
pub use project::{ProjectSpec, ProjectState, SyncStatus, BUILD_DIR_NAME};
pub use publish::{ArtifactUploader, Notifier};
pub use shell::{drain, OutputEvent, OutputStream, ShellCommand, ShellRunner, SystemShell};
pub use signature::{
    LinePattern, SignatureSet, SignatureTable, Step, ASSEMBLY_SUCCESS_MARKER, UP_TO_DATE_MARKER,
};
pub use telemetry::{init_tracing, OUTPUT_TARGET};
