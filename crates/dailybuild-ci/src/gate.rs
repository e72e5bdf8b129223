//! Packaging gate: packaging runs only on a clean run.

use dailybuild_core::ErrorAggregator;
use serde::{Deserialize, Serialize};

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether packaging may run.
    pub passed: bool,

    /// Rendered records that closed the gate (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Packaging gate rules.
pub struct PackagingGate;

impl PackagingGate {
    /// The gate is open iff no error record exists after every project has been
    /// visited. There is no partial-success path.
    pub fn evaluate(errors: &ErrorAggregator) -> GateVerdict {
        let violations: Vec<String> = errors.iter().map(|r| r.to_string()).collect();
        let passed = violations.is_empty();
        let message = if passed {
            "All projects built cleanly".to_string()
        } else {
            format!("Packaging blocked by {} error(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}
