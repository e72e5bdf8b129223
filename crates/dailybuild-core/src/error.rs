//! Error taxonomy for dailybuild.
//!
//! Two layers live here:
//! - [`BuildError`]: library failures (I/O, spawning, profile loading) returned
//!   through `Result`.
//! - [`ErrorKind`] / [`ErrorRecord`]: the run-level records collected by the
//!   [`ErrorAggregator`](crate::aggregator::ErrorAggregator) and reported at the
//!   end of a run.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Library-level errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start `{command}` in {work_dir}: {source}")]
    Spawn {
        command: String,
        work_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("working copy not found: {0}")]
    MissingWorkingCopy(PathBuf),

    #[error("invalid platform profile: {0}")]
    Profile(String),

    #[error("template missing: {0}")]
    Template(PathBuf),

    #[error("could not resolve version: {0}")]
    Version(String),

    #[error("profile parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for dailybuild library operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Category of a run-level error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SyncError,
    ConfigureError,
    CompileError,
    InstallError,
    PackagingError,
    AssemblyError,
    /// Non-fatal; never enters the aggregator.
    UploadError,
    UnhandledError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyncError => "SyncError",
            ErrorKind::ConfigureError => "ConfigureError",
            ErrorKind::CompileError => "CompileError",
            ErrorKind::InstallError => "InstallError",
            ErrorKind::PackagingError => "PackagingError",
            ErrorKind::AssemblyError => "AssemblyError",
            ErrorKind::UploadError => "UploadError",
            ErrorKind::UnhandledError => "UnhandledError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error observed during a run. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Project the error belongs to; `None` for run-level failures.
    pub project: Option<String>,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, project: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            project: project.map(str::to_string),
            message: message.into(),
        }
    }

    /// Record tied to a project.
    pub fn for_project(kind: ErrorKind, project: &str, message: impl Into<String>) -> Self {
        Self::new(kind, Some(project), message)
    }

    /// Run-level record with no owning project.
    pub fn run_level(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, None, message)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{} [{}]: {}", self.kind, project, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::Profile("no projects".to_string());
        assert!(err.to_string().contains("invalid platform profile"));

        let err = BuildError::MissingWorkingCopy(PathBuf::from("/srv/missing"));
        assert!(err.to_string().contains("/srv/missing"));
    }

    #[test]
    fn test_spawn_error_names_command_and_dir() {
        let err = BuildError::Spawn {
            command: "cmake ../".to_string(),
            work_dir: PathBuf::from("/tmp/build"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cmake ../"));
        assert!(msg.contains("/tmp/build"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_record_display_with_project() {
        let record = ErrorRecord::for_project(
            ErrorKind::ConfigureError,
            "libopenshot",
            "CMake Error: bad path",
        );
        assert_eq!(
            record.to_string(),
            "ConfigureError [libopenshot]: CMake Error: bad path"
        );
    }

    #[test]
    fn test_error_record_display_run_level() {
        let record = ErrorRecord::run_level(ErrorKind::UnhandledError, "boom");
        assert_eq!(record.to_string(), "UnhandledError: boom");
        assert!(record.project.is_none());
    }
}
