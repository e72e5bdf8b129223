//! Declarative output classification.
//!
//! Every external step is classified purely from its merged output lines. The
//! table below is the single place that knows which substrings mean failure
//! (or success) for which step; control flow never inspects lines directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Marker printed by `git fetch -v --dry-run` for a branch with nothing new.
pub const UP_TO_DATE_MARKER: &str = "[up to date]";

/// Success line printed by AppImageAssistant. The spelling matches the tool's
/// actual output and must not be corrected.
pub const ASSEMBLY_SUCCESS_MARKER: &str = "completed sucessfully";

/// An external step whose output is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    SyncCheck,
    Pull,
    Configure,
    Compile,
    Install,
    Freeze,
    Assembly,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::SyncCheck => "sync_check",
            Step::Pull => "pull",
            Step::Configure => "configure",
            Step::Compile => "compile",
            Step::Install => "install",
            Step::Freeze => "freeze",
            Step::Assembly => "assembly",
        }
    }

    /// Error category for records produced by this step.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Step::SyncCheck | Step::Pull => ErrorKind::SyncError,
            Step::Configure => ErrorKind::ConfigureError,
            Step::Compile => ErrorKind::CompileError,
            Step::Install => ErrorKind::InstallError,
            Step::Freeze => ErrorKind::PackagingError,
            Step::Assembly => ErrorKind::AssemblyError,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Case-sensitive substring predicate with optional exclusions.
///
/// A line matches when it contains `needle` and none of `unless`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePattern {
    pub needle: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unless: Vec<String>,
}

impl LinePattern {
    pub fn contains(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            unless: Vec::new(),
        }
    }

    /// Exclude lines that also contain `benign`.
    pub fn unless(mut self, benign: impl Into<String>) -> Self {
        self.unless.push(benign.into());
        self
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(self.needle.as_str())
            && !self.unless.iter().any(|benign| line.contains(benign.as_str()))
    }
}

/// Failure and success signatures for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    pub failure: Vec<LinePattern>,
    pub success: Option<LinePattern>,
}

impl SignatureSet {
    pub fn failing_on<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failure: needles.into_iter().map(LinePattern::contains).collect(),
            success: None,
        }
    }

    pub fn with_failure(mut self, pattern: LinePattern) -> Self {
        self.failure.push(pattern);
        self
    }

    pub fn with_success(mut self, marker: impl Into<String>) -> Self {
        self.success = Some(LinePattern::contains(marker));
        self
    }

    /// First failure pattern matching `line`. At most one match per line.
    pub fn first_failure(&self, line: &str) -> Option<&LinePattern> {
        self.failure.iter().find(|p| p.matches(line))
    }

    pub fn is_success(&self, line: &str) -> bool {
        self.success.as_ref().is_some_and(|p| p.matches(line))
    }
}

/// Step -> signatures lookup.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    sets: HashMap<Step, SignatureSet>,
}

impl SignatureTable {
    /// The signature contracts of the supported toolchain.
    pub fn standard() -> Self {
        let mut sets = HashMap::new();
        sets.insert(
            Step::SyncCheck,
            SignatureSet::default().with_success(UP_TO_DATE_MARKER),
        );
        sets.insert(Step::Pull, SignatureSet::default());
        sets.insert(
            Step::Configure,
            SignatureSet::failing_on(["CMake Error", "Configuring incomplete"]),
        );
        sets.insert(
            Step::Compile,
            SignatureSet::failing_on([": error:", "No targets specified"]),
        );
        sets.insert(
            Step::Install,
            SignatureSet::failing_on(["[install] Error", "CMake Error"]),
        );
        sets.insert(
            Step::Freeze,
            SignatureSet::default().with_failure(
                LinePattern::contains("logger:ERROR")
                    .unless("importlib/__init__.pyc")
                    .unless("zinfo"),
            ),
        );
        sets.insert(
            Step::Assembly,
            SignatureSet::failing_on(["error"]).with_success(ASSEMBLY_SUCCESS_MARKER),
        );
        Self { sets }
    }

    /// Replace the signatures of one step.
    pub fn with(mut self, step: Step, set: SignatureSet) -> Self {
        self.sets.insert(step, set);
        self
    }

    pub fn get(&self, step: Step) -> &SignatureSet {
        static EMPTY: SignatureSet = SignatureSet {
            failure: Vec::new(),
            success: None,
        };
        self.sets.get(&step).unwrap_or(&EMPTY)
    }
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self::standard()
    }
}
