//! Per-operation run statistics

use std::collections::{BTreeMap, HashMap};
use std::ops::Index;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::case::{Case, CaseSnapshot};
use crate::catalog::OperationId;

/// Distinct error messages kept per operation.
const MAX_ERROR_MESSAGES: usize = 5;

/// Result of executing one Case.
#[derive(Debug, Clone)]
pub enum Outcome {
    Pass,
    Fail {
        check: String,
        message: String,
        /// Minimal reproducing case (after shrinking, when enabled)
        case: Case,
    },
    Error {
        message: String,
    },
}

/// First failure observed for an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FailureSample {
    pub check: String,
    pub message: String,
    pub case: CaseSnapshot,
}

/// Counters for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OperationStats {
    pub total: u64,
    pub passes: u64,
    pub failures: u64,
    pub errors: u64,
    /// Failure count per check name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_checks: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<FailureSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<String>,
}

impl OperationStats {
    fn apply(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Pass => self.passes += 1,
            Outcome::Fail {
                check,
                message,
                case,
            } => {
                self.failures += 1;
                *self.failed_checks.entry(check.clone()).or_default() += 1;
                if self.sample.is_none() {
                    self.sample = Some(FailureSample {
                        check,
                        message,
                        case: case.snapshot(),
                    });
                }
            }
            Outcome::Error { message } => {
                self.errors += 1;
                if self.error_messages.len() < MAX_ERROR_MESSAGES
                    && !self.error_messages.contains(&message)
                {
                    self.error_messages.push(message);
                }
            }
        }
        debug_assert_eq!(self.total, self.passes + self.failures + self.errors);
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.errors == 0
    }
}

/// Mutable aggregator owned by the runner for the duration of a run.
///
/// Operations are kept in the order they were first seen, which is catalog
/// order when the runner registers them up front.
#[derive(Debug, Default)]
pub struct RunStats {
    entries: Vec<(OperationId, OperationStats)>,
    index: HashMap<OperationId, usize>,
}

impl RunStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an entry exists so operations that produce no cases still show up.
    pub fn register(&mut self, id: &OperationId) {
        self.slot(id);
    }

    pub fn record(&mut self, id: &OperationId, outcome: Outcome) {
        self.slot(id).apply(outcome);
    }

    #[must_use]
    pub fn get(&self, id: &OperationId) -> Option<&OperationStats> {
        self.index.get(id).map(|&i| &self.entries[i].1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            operations: self
                .entries
                .iter()
                .map(|(id, stats)| OperationSummary {
                    operation: id.clone(),
                    stats: stats.clone(),
                })
                .collect(),
        }
    }

    fn slot(&mut self, id: &OperationId) -> &mut OperationStats {
        let i = match self.index.get(id) {
            Some(&i) => i,
            None => {
                self.entries.push((id.clone(), OperationStats::default()));
                let i = self.entries.len() - 1;
                self.index.insert(id.clone(), i);
                i
            }
        };
        &mut self.entries[i].1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OperationSummary {
    pub operation: OperationId,
    #[serde(flatten)]
    pub stats: OperationStats,
}

/// Read-only copy of [`RunStats`], in operation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatsSnapshot {
    pub operations: Vec<OperationSummary>,
}

impl StatsSnapshot {
    #[must_use]
    pub fn get(&self, operation: &str) -> Option<&OperationStats> {
        self.operations
            .iter()
            .find(|o| o.operation.as_str() == operation)
            .map(|o| &o.stats)
    }

    /// Sum of every operation's counters.
    #[must_use]
    pub fn totals(&self) -> OperationStats {
        let mut sum = OperationStats::default();
        for op in &self.operations {
            sum.total += op.stats.total;
            sum.passes += op.stats.passes;
            sum.failures += op.stats.failures;
            sum.errors += op.stats.errors;
        }
        sum
    }

    #[must_use]
    pub fn samples(&self) -> impl Iterator<Item = &FailureSample> {
        self.operations.iter().filter_map(|o| o.stats.sample.as_ref())
    }
}

impl Index<&str> for StatsSnapshot {
    type Output = OperationStats;

    fn index(&self, operation: &str) -> &OperationStats {
        match self.get(operation) {
            Some(stats) => stats,
            None => panic!("no statistics recorded for {operation}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Method, Operation};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn op(method: Method, path: &str) -> Arc<Operation> {
        Arc::new(Operation::new(method, path, Vec::new(), Vec::new()))
    }

    fn fail(case: &Case, message: &str) -> Outcome {
        Outcome::Fail {
            check: "not_a_server_error".into(),
            message: message.into(),
            case: case.clone(),
        }
    }

    #[test]
    fn record_updates_counters() {
        let foo = op(Method::Get, "/foo");
        let mut stats = RunStats::new();
        stats.record(foo.id(), Outcome::Pass);
        stats.record(foo.id(), Outcome::Pass);
        stats.record(
            foo.id(),
            Outcome::Error {
                message: "timeout".into(),
            },
        );

        let s = stats.get(foo.id()).unwrap();
        assert_eq!((s.total, s.passes, s.failures, s.errors), (3, 2, 0, 1));
        assert_eq!(s.error_messages, vec!["timeout"]);
        assert!(!s.is_clean());
    }

    #[test]
    fn first_failure_is_kept_as_sample() {
        let bar = op(Method::Post, "/bar");
        let mut first = Case::new(bar.clone());
        first.path = "/bar?first".into();
        let second = Case::new(bar.clone());

        let mut stats = RunStats::new();
        stats.record(bar.id(), fail(&first, "500 Internal Server Error"));
        stats.record(bar.id(), fail(&second, "502 Bad Gateway"));

        let s = stats.get(bar.id()).unwrap();
        assert_eq!(s.failures, 2);
        assert_eq!(s.failed_checks["not_a_server_error"], 2);
        let sample = s.sample.as_ref().unwrap();
        assert_eq!(sample.message, "500 Internal Server Error");
        assert_eq!(sample.case.path, "/bar?first");
    }

    #[test]
    fn error_messages_deduplicated_and_capped() {
        let foo = op(Method::Get, "/foo");
        let mut stats = RunStats::new();
        for i in 0..10 {
            for _ in 0..2 {
                stats.record(
                    foo.id(),
                    Outcome::Error {
                        message: format!("error {i}"),
                    },
                );
            }
        }
        let s = stats.get(foo.id()).unwrap();
        assert_eq!(s.errors, 20);
        assert_eq!(s.error_messages.len(), MAX_ERROR_MESSAGES);
        assert_eq!(s.error_messages[0], "error 0");
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let a = op(Method::Get, "/b");
        let b = op(Method::Get, "/a");
        let mut stats = RunStats::new();
        stats.register(a.id());
        stats.register(b.id());
        stats.record(b.id(), Outcome::Pass);
        stats.record(a.id(), Outcome::Pass);
        stats.register(a.id());

        let snap = stats.snapshot();
        let order: Vec<_> = snap.operations.iter().map(|o| o.operation.as_str()).collect();
        assert_eq!(order, vec!["GET /b", "GET /a"]);
        assert_eq!(snap["GET /a"].passes, 1);
    }

    #[test]
    fn registered_operation_without_cases_is_zeroed() {
        let a = op(Method::Delete, "/x");
        let mut stats = RunStats::new();
        stats.register(a.id());
        let snap = stats.snapshot();
        assert_eq!(snap["DELETE /x"], OperationStats::default());
        assert!(snap.get("GET /x").is_none());
    }

    #[test]
    fn snapshot_serializes_flat_counters() {
        let foo = op(Method::Get, "/foo");
        let mut stats = RunStats::new();
        stats.record(foo.id(), Outcome::Pass);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["operations"][0]["operation"], "GET /foo");
        assert_eq!(json["operations"][0]["total"], 1);
        assert_eq!(json["operations"][0]["passes"], 1);
        assert!(json["operations"][0].get("sample").is_none());
    }

    #[test]
    fn totals_sum_operations() {
        let a = op(Method::Get, "/a");
        let b = op(Method::Post, "/b");
        let mut stats = RunStats::new();
        stats.record(a.id(), Outcome::Pass);
        stats.record(b.id(), fail(&Case::new(b.clone()), "boom"));
        stats.record(
            b.id(),
            Outcome::Error {
                message: "refused".into(),
            },
        );
        let t = stats.snapshot().totals();
        assert_eq!((t.total, t.passes, t.failures, t.errors), (3, 1, 1, 1));
    }

    fn outcome_kind() -> impl Strategy<Value = u8> {
        0u8..3
    }

    proptest! {
        #[test]
        fn total_always_equals_sum(kinds in prop::collection::vec(outcome_kind(), 0..200)) {
            let foo = op(Method::Get, "/foo");
            let case = Case::new(foo.clone());
            let mut stats = RunStats::new();
            for k in &kinds {
                let outcome = match k {
                    0 => Outcome::Pass,
                    1 => fail(&case, "bad"),
                    _ => Outcome::Error { message: "err".into() },
                };
                stats.record(foo.id(), outcome);
                let s = stats.get(foo.id()).unwrap();
                prop_assert_eq!(s.total, s.passes + s.failures + s.errors);
            }
            let expected = kinds.len() as u64;
            prop_assert_eq!(stats.get(foo.id()).map_or(0, |s| s.total), expected);
        }
    }
}
