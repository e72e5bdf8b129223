//! Buildable projects and their per-run state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name of the per-project build output directory.
pub const BUILD_DIR_NAME: &str = "build";

/// Identity of one buildable unit.
///
/// Position in the project list is the dependency order: a project may only
/// depend on projects listed before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    /// Short display name used to tag records and logs.
    pub name: String,

    /// Local working copy.
    pub path: PathBuf,

    /// Arguments passed to the configure command. Empty means the project is
    /// only consumed by packaging and is never compiled.
    #[serde(default)]
    pub configure_args: String,

    /// Upstream origin pulled on update.
    pub origin: String,
}

impl ProjectSpec {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        configure_args: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            configure_args: configure_args.into(),
            origin: origin.into(),
        }
    }

    /// Whether compile and install steps are skipped for this project.
    pub fn is_packaging_only(&self) -> bool {
        self.configure_args.trim().is_empty()
    }

    pub fn build_dir(&self) -> PathBuf {
        self.path.join(BUILD_DIR_NAME)
    }

    pub fn working_copy(&self) -> &Path {
        &self.path
    }
}

/// Result of the upstream check for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    UpToDate,
    UpdateAvailable,
}

/// Per-project position in the orchestrator's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    Checking,
    /// Nothing new upstream. Terminal.
    UpToDate,
    /// Upstream check could not run. Terminal; nothing is guessed.
    Skipped,
    Updating,
    Building,
    /// Configure, compile and install all ran. Terminal.
    Installed,
    /// Packaging-only project pulled and reset, nothing compiled. Terminal.
    Refreshed,
}

impl ProjectState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProjectState::UpToDate
                | ProjectState::Skipped
                | ProjectState::Installed
                | ProjectState::Refreshed
        )
    }
}
