//! Dry run plan types and config validation
//!
//! Describes what a run *would* do without sending any requests.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::{Location, Method, Operation};
use crate::config::{AuthType, Config, GenerationSettings, Phase};

/// Complete dry run plan: operations, case counts, and config warnings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunPlan {
    pub operations: Vec<OperationPlan>,
    /// Upper bound on cases that would be dispatched (shrinking excluded)
    pub total_cases: u64,
    #[serde(default)]
    pub validations: Vec<Validation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationPlan {
    /// Operation label, e.g. "POST /api/users"
    pub operation: String,
    pub method: Method,
    pub path: String,
    /// Whether a case built from declared examples runs first
    pub explicit: bool,
    /// Boundary cases; an upper bound, since unplaceable ones are skipped
    #[serde(default)]
    pub boundary: u32,
    /// Random cases
    pub generated: u32,
    /// `name (location)` for path, query, header and cookie parameters
    pub parameters: Vec<String>,
    /// Top-level properties of the JSON body schema
    pub body_properties: Vec<String>,
}

impl OperationPlan {
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.generated) + u64::from(self.boundary) + u64::from(self.explicit)
    }
}

/// A validation check result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub check: String,
    pub status: ValidationStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Whether an example case can be built: some parameter declares an example
/// and every required one does.
#[must_use]
pub fn has_explicit_example(op: &Operation) -> bool {
    op.parameters.iter().any(|p| p.example.is_some())
        && op
            .parameters
            .iter()
            .filter(|p| p.required)
            .all(|p| p.example.is_some())
}

impl RunPlan {
    /// `boundary_cases` counts the boundary cases of one operation; it is
    /// only called when that phase is enabled.
    #[must_use]
    pub fn build(
        operations: &[Arc<Operation>],
        settings: &GenerationSettings,
        boundary_cases: impl Fn(&Arc<Operation>) -> u32,
    ) -> Self {
        let generate = settings.has_phase(Phase::Generate);
        let explicit_phase = settings.has_phase(Phase::Explicit);
        let boundary_phase = settings.has_phase(Phase::Boundary);
        let operations: Vec<OperationPlan> = operations
            .iter()
            .map(|op| OperationPlan {
                operation: op.id().to_string(),
                method: op.method,
                path: op.path.clone(),
                explicit: explicit_phase && has_explicit_example(op),
                boundary: if boundary_phase { boundary_cases(op) } else { 0 },
                generated: if generate { settings.max_examples } else { 0 },
                parameters: op
                    .parameters
                    .iter()
                    .filter(|p| p.location != Location::Body)
                    .map(|p| format!("{} ({})", p.name, p.location))
                    .collect(),
                body_properties: op
                    .body()
                    .and_then(|b| b.schema.get("properties"))
                    .and_then(|p| p.as_object())
                    .map(|props| props.keys().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();
        let total_cases = operations.iter().map(OperationPlan::total).sum();
        Self {
            operations,
            total_cases,
            validations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_validations(mut self, validations: Vec<Validation>) -> Self {
        self.validations = validations;
        self
    }

    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Dry run: {} operations, {} cases planned\n",
            self.operations.len(),
            self.total_cases,
        ));

        for op in &self.operations {
            let boundary = if op.boundary > 0 {
                format!(" + {} boundary", op.boundary)
            } else {
                String::new()
            };
            let explicit = if op.explicit { " + 1 explicit" } else { "" };
            lines.push(format!(
                "{} ({} generated{boundary}{explicit}):",
                op.operation, op.generated
            ));
            if !op.parameters.is_empty() {
                lines.push(format!("  Parameters: {}", op.parameters.join(", ")));
            }
            if !op.body_properties.is_empty() {
                lines.push(format!(
                    "  Body properties: {}",
                    op.body_properties.join(", ")
                ));
            }
            lines.push(String::new());
        }

        if !self.validations.is_empty() {
            lines.push("Config validation:".into());
            for v in &self.validations {
                lines.push(format!("  [{}] {}", v.status, v.message));
            }
        }

        lines.join("\n")
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Error)
    }
}

/// Values that look like a placeholder rather than a real credential.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-token",
    "your_token",
    "YOUR_TOKEN",
    "your-api-key",
    "YOUR_API_KEY",
    "CHANGEME",
    "changeme",
    "placeholder",
    "replace-me",
    "REPLACE_ME",
];

/// Validate config against the base URL that will actually be used.
#[must_use]
pub fn validate_config(config: &Config, base_url: Option<&str>) -> Vec<Validation> {
    let mut checks = Vec::new();

    match base_url {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            checks.push(Validation {
                check: "base_url".into(),
                status: ValidationStatus::Ok,
                message: format!("base_url: {url}"),
            });
        }
        Some(url) => checks.push(Validation {
            check: "base_url".into(),
            status: ValidationStatus::Warning,
            message: format!("base_url: {url} (missing http:// or https:// prefix)"),
        }),
        None => checks.push(Validation {
            check: "base_url".into(),
            status: ValidationStatus::Error,
            message: "base_url: not configured and the schema declares no server".into(),
        }),
    }

    let mut header_issues = Vec::new();
    for (key, value) in &config.headers {
        if value.contains('<') && value.contains('>') {
            header_issues.push(format!("{key}: contains '<...>' placeholder"));
        } else if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| value.contains(**p)) {
            header_issues.push(format!("{key}: contains '{pattern}', may be a placeholder"));
        }
    }
    if header_issues.is_empty() {
        checks.push(Validation {
            check: "headers".into(),
            status: ValidationStatus::Ok,
            message: format!("headers: {} configured", config.headers.len()),
        });
    }
    for issue in header_issues {
        checks.push(Validation {
            check: "headers".into(),
            status: ValidationStatus::Warning,
            message: issue,
        });
    }

    if config
        .auth
        .as_ref()
        .is_some_and(|auth| auth.kind == AuthType::Digest)
    {
        checks.push(Validation {
            check: "auth".into(),
            status: ValidationStatus::Error,
            message: "auth: digest authentication is not supported".into(),
        });
    }

    if config.generation.phases.is_empty() {
        checks.push(Validation {
            check: "phases".into(),
            status: ValidationStatus::Warning,
            message: "phases: none enabled, no cases will run".into(),
        });
    }

    checks
}
