//! Response checks
//!
//! A check looks at one case and the response it produced and either passes
//! or explains what is wrong. No I/O.

use std::time::Duration;

use apiprop_core::Case;
use serde_json::Value;

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub elapsed: Duration,
}

impl Response {
    /// First header named `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Media type of the `Content-Type` header, lowercased, parameters dropped.
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(media_type)
    }

    #[must_use]
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

fn media_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{check}: {message}")]
pub struct CheckFailure {
    pub check: &'static str,
    pub message: String,
}

impl CheckFailure {
    fn new(check: &'static str, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }
}

/// A named response property.
pub trait Check: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns [`CheckFailure`] when `response` violates the property.
    fn check(&self, case: &Case, response: &Response) -> Result<(), CheckFailure>;
}

/// 5xx responses fail.
pub struct NotAServerError;

impl Check for NotAServerError {
    fn name(&self) -> &'static str {
        "not_a_server_error"
    }

    fn check(&self, _case: &Case, response: &Response) -> Result<(), CheckFailure> {
        if (500..600).contains(&response.status) {
            return Err(CheckFailure::new(
                self.name(),
                format!("Received a response with 5xx status code: {}", response.status),
            ));
        }
        Ok(())
    }
}

/// Status must be declared, unless nothing is declared or a `default` exists.
pub struct StatusCodeConformance;

impl Check for StatusCodeConformance {
    fn name(&self) -> &'static str {
        "status_code_conformance"
    }

    fn check(&self, case: &Case, response: &Response) -> Result<(), CheckFailure> {
        let responses = &case.operation.responses;
        if responses.is_empty() || case.operation.response_for(response.status).is_some() {
            return Ok(());
        }
        let declared: Vec<String> = responses.iter().map(|r| r.status.to_string()).collect();
        Err(CheckFailure::new(
            self.name(),
            format!(
                "Received undocumented status code {} (declared: {})",
                response.status,
                declared.join(", ")
            ),
        ))
    }
}

/// Response media type must be one declared for the status.
pub struct ContentTypeConformance;

impl Check for ContentTypeConformance {
    fn name(&self) -> &'static str {
        "content_type_conformance"
    }

    fn check(&self, case: &Case, response: &Response) -> Result<(), CheckFailure> {
        let Some(declared) = case
            .operation
            .response_for(response.status)
            .map(|r| &r.content_types)
            .filter(|types| !types.is_empty())
        else {
            return Ok(());
        };
        let Some(actual) = response.content_type() else {
            return Err(CheckFailure::new(
                self.name(),
                format!("Missing Content-Type header, expected one of {declared:?}"),
            ));
        };
        if declared.iter().any(|t| media_matches(&media_type(t), &actual)) {
            Ok(())
        } else {
            Err(CheckFailure::new(
                self.name(),
                format!("Received \"{actual}\", expected one of {declared:?}"),
            ))
        }
    }
}

/// `declared` may use `*/*` or `type/*` wildcards.
fn media_matches(declared: &str, actual: &str) -> bool {
    if declared == "*/*" || declared == actual {
        return true;
    }
    match declared.strip_suffix("/*") {
        Some(main) => actual.split('/').next() == Some(main),
        None => false,
    }
}

/// JSON body must validate against the schema declared for the status.
pub struct ResponseSchemaConformance;

/// Validation errors reported per failure.
const MAX_SCHEMA_ERRORS: usize = 5;

impl Check for ResponseSchemaConformance {
    fn name(&self) -> &'static str {
        "response_schema_conformance"
    }

    fn check(&self, case: &Case, response: &Response) -> Result<(), CheckFailure> {
        let Some(schema) = case
            .operation
            .response_for(response.status)
            .and_then(|r| r.schema.as_ref())
            .filter(|s| s.as_object().is_some_and(|o| !o.is_empty()))
        else {
            return Ok(());
        };
        if response.body.trim().is_empty() {
            return Ok(());
        }
        let Some(body) = response.json() else {
            let preview: String = response.body.chars().take(200).collect();
            return Err(CheckFailure::new(
                self.name(),
                format!("Response body is not valid JSON: {preview}"),
            ));
        };
        let validator = match jsonschema::validator_for(schema) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(operation = %case.id(), error = %e, "response schema not compilable");
                return Ok(());
            }
        };
        let errors: Vec<String> = validator
            .iter_errors(&body)
            .take(MAX_SCHEMA_ERRORS)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CheckFailure::new(
                self.name(),
                format!("Response violates schema: {}", errors.join("; ")),
            ))
        }
    }
}

/// Names accepted by [`CheckSet::from_names`].
pub const BUILTIN_CHECKS: [&str; 4] = [
    "not_a_server_error",
    "status_code_conformance",
    "content_type_conformance",
    "response_schema_conformance",
];

fn builtin(name: &str) -> Option<Box<dyn Check>> {
    match name {
        "not_a_server_error" => Some(Box::new(NotAServerError)),
        "status_code_conformance" => Some(Box::new(StatusCodeConformance)),
        "content_type_conformance" => Some(Box::new(ContentTypeConformance)),
        "response_schema_conformance" => Some(Box::new(ResponseSchemaConformance)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown check: {0} (available: {available})", available = BUILTIN_CHECKS.join(", "))]
pub struct UnknownCheck(pub String);

/// Ordered checks run against every response.
pub struct CheckSet {
    checks: Vec<Box<dyn Check>>,
}

impl CheckSet {
    /// Every built-in check.
    #[must_use]
    pub fn all() -> Self {
        Self {
            checks: BUILTIN_CHECKS.iter().filter_map(|n| builtin(n)).collect(),
        }
    }

    /// Checks by name, in the order given. An empty list selects all.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownCheck`] for a name that is not built in.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownCheck> {
        if names.is_empty() {
            return Ok(Self::all());
        }
        let mut checks: Vec<Box<dyn Check>> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            let check = builtin(name).ok_or_else(|| UnknownCheck(name.to_string()))?;
            if !checks.iter().any(|c| c.name() == check.name()) {
                checks.push(check);
            }
        }
        Ok(Self { checks })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn push(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().map(|c| c.name())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Check> {
        self.checks
            .iter()
            .find(|c| c.name() == name)
            .map(|c| &**c)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run checks in order; the first failure wins.
    ///
    /// # Errors
    ///
    /// Returns the first [`CheckFailure`].
    pub fn run(&self, case: &Case, response: &Response) -> Result<(), CheckFailure> {
        self.checks.iter().try_for_each(|c| c.check(case, response))
    }
}

impl Default for CheckSet {
    fn default() -> Self {
        Self::all()
    }
}
