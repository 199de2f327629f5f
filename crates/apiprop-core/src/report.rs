//! Run report rendering: terminal text, JSON, and `.http` reproductions

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::Verbosity;
use crate::stats::{FailureSample, StatsSnapshot};
use crate::verdict::{Verdict, VerdictStatus};

/// Machine-readable result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub verdict: Verdict,
    /// Base URL the cases were sent to
    pub base_url: String,
    /// Seed used when it was fixed for the whole run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub stats: StatsSnapshot,
}

impl RunReport {
    #[must_use]
    pub fn new(base_url: impl Into<String>, seed: Option<u64>, stats: StatsSnapshot) -> Self {
        Self {
            verdict: Verdict::from_snapshot(&stats),
            base_url: base_url.into(),
            seed,
            stats,
        }
    }

    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self, verbosity: Verbosity) -> String {
        let mut lines = Vec::new();

        if verbosity > Verbosity::Quiet {
            let width = self
                .stats
                .operations
                .iter()
                .map(|o| o.operation.as_str().len())
                .max()
                .unwrap_or(0);
            for op in &self.stats.operations {
                let s = &op.stats;
                let mark = if s.is_clean() { "." } else { "F" };
                lines.push(format!(
                    "{:<width$}  {mark}  {} passed, {} failed, {} errors",
                    op.operation.as_str(),
                    s.passes,
                    s.failures,
                    s.errors,
                ));
                if verbosity == Verbosity::Verbose {
                    for (check, count) in &s.failed_checks {
                        lines.push(format!("    {check}: {count}"));
                    }
                }
            }

            let failures: Vec<&FailureSample> = self.stats.samples().collect();
            if !failures.is_empty() {
                lines.push(String::new());
                lines.push(format!("Failures ({}):", failures.len()));
                for sample in failures {
                    lines.push(format!(
                        "  {} [{}] {}",
                        sample.case.operation, sample.check, sample.message
                    ));
                    lines.push(format!(
                        "    {} {}",
                        sample.case.method,
                        sample.case.target()
                    ));
                    for (k, v) in &sample.case.headers {
                        lines.push(format!("    {k}: {v}"));
                    }
                    if let Some(body) = &sample.case.body {
                        lines.push(format!("    {body}"));
                    }
                }
            }

            let errored: Vec<_> = self
                .stats
                .operations
                .iter()
                .filter(|o| o.stats.errors > 0)
                .collect();
            if !errored.is_empty() {
                lines.push(String::new());
                lines.push("Errors:".to_string());
                for op in errored {
                    let shown = if verbosity == Verbosity::Verbose {
                        op.stats.error_messages.len()
                    } else {
                        1
                    };
                    for msg in op.stats.error_messages.iter().take(shown) {
                        lines.push(format!("  {}: {msg}", op.operation));
                    }
                }
            }
            lines.push(String::new());
        }

        let totals = self.stats.totals();
        let icon = match self.verdict.status {
            VerdictStatus::Pass => "PASS",
            VerdictStatus::Fail => "FAIL",
        };
        lines.push(format!(
            "{icon}: {} ({} cases: {} passed, {} failed, {} errors)",
            self.verdict.reason, totals.total, totals.passes, totals.failures, totals.errors
        ));
        if let Some(seed) = self.seed {
            lines.push(format!("Seed: {seed}"));
        }

        lines.join("\n")
    }
}

/// JSON Schema of [`RunReport`], pretty-printed.
///
/// # Errors
///
/// Returns an error if the schema cannot be serialized.
pub fn generate_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(RunReport);
    serde_json::to_string_pretty(&schema)
}

/// Generate `.http` file content reproducing each minimal failing case.
#[must_use]
pub fn to_http_file(stats: &StatsSnapshot, base_url_var: &str) -> String {
    let samples: Vec<&FailureSample> = stats.samples().collect();
    let mut lines = Vec::new();

    lines.push(format!(
        "# Minimal failing cases ({} operations)",
        samples.len()
    ));
    lines.push(format!("# Base URL variable: {{{{{base_url_var}}}}}"));
    lines.push(String::new());

    for (idx, sample) in samples.iter().enumerate() {
        let case = &sample.case;
        lines.push(format!("### [{idx}] {} - {}", case.operation, sample.check));
        lines.push(format!("# {}", sample.message));
        lines.push(format!(
            "{} {{{{{base_url_var}}}}}{}",
            case.method,
            case.target()
        ));

        for (key, value) in &case.headers {
            if !matches!(key.to_lowercase().as_str(), "host" | "content-length") {
                lines.push(format!("{key}: {value}"));
            }
        }
        if !case.cookies.is_empty() {
            let cookie = case
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            lines.push(format!("Cookie: {cookie}"));
        }

        if let Some(body) = &case.body {
            if !case
                .headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            {
                lines.push("Content-Type: application/json".to_string());
            }
            lines.push(String::new());
            lines.push(serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()));
        }

        lines.push(String::new());
        lines.push("###".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}
