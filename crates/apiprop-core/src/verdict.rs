//! Overall pass/fail judgement of a run

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::stats::StatsSnapshot;

/// Process exit code for a clean run.
pub const EXIT_OK: i32 = 0;
/// Some operation recorded a failure or an error.
pub const EXIT_FAIL: i32 = 1;
/// The run could not start (schema or configuration problem).
pub const EXIT_FATAL: i32 = 2;

/// Final verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub exit_code: i32,
    pub reason: String,
}

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

impl Verdict {
    /// FAIL iff any operation has at least one failure or error.
    #[must_use]
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Self {
        let mut failing_ops = 0usize;
        let mut erroring_ops = 0usize;
        for op in &snapshot.operations {
            if op.stats.failures > 0 {
                failing_ops += 1;
            }
            if op.stats.errors > 0 {
                erroring_ops += 1;
            }
        }

        if failing_ops == 0 && erroring_ops == 0 {
            let totals = snapshot.totals();
            let reason = if snapshot.operations.is_empty() {
                "No operations selected".to_string()
            } else {
                format!(
                    "{} cases passed across {} operations",
                    totals.passes,
                    snapshot.operations.len()
                )
            };
            return Self {
                status: VerdictStatus::Pass,
                exit_code: EXIT_OK,
                reason,
            };
        }

        let mut parts = Vec::new();
        if failing_ops > 0 {
            parts.push(format!("{failing_ops} operations with failures"));
        }
        if erroring_ops > 0 {
            parts.push(format!("{erroring_ops} operations with errors"));
        }
        Self {
            status: VerdictStatus::Fail,
            exit_code: EXIT_FAIL,
            reason: parts.join("; "),
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == VerdictStatus::Pass
    }
}
