//! Concrete request instances generated for an operation

use std::fmt;
use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{Method, Operation, OperationId};

/// Everything except RFC 3986 unreserved characters gets percent-encoded.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One fully-instantiated request for an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub operation: Arc<Operation>,
    /// Path with placeholders substituted (already percent-encoded)
    pub path: String,
    /// Raw (unencoded) values substituted into the path
    pub path_parameters: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Case {
    /// Empty case: no parameters, path equal to the template.
    #[must_use]
    pub fn new(operation: Arc<Operation>) -> Self {
        let path = operation.path.clone();
        Self {
            operation,
            path,
            path_parameters: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &OperationId {
        self.operation.id()
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.operation.method
    }

    /// `a=1&b=x%20y`, empty when there are no query parameters.
    #[must_use]
    pub fn query_string(&self) -> String {
        encode_query(&self.query)
    }

    /// Absolute URL of this case against `base_url`.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        let mut url = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let query = self.query_string();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    /// `Cookie` header value, if the case carries cookies.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    #[must_use]
    pub fn snapshot(&self) -> CaseSnapshot {
        CaseSnapshot {
            operation: self.id().clone(),
            method: self.method(),
            path: self.path.clone(),
            path_parameters: self.path_parameters.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
            body: self.body.clone(),
        }
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path)?;
        let query = self.query_string();
        if !query.is_empty() {
            write!(f, "?{query}")?;
        }
        if let Some(body) = &self.body {
            write!(f, " {body}")?;
        }
        Ok(())
    }
}

/// Serializable copy of a [`Case`], used in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaseSnapshot {
    pub operation: OperationId,
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_parameters: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl CaseSnapshot {
    /// Path plus encoded query string, relative to the base URL.
    #[must_use]
    pub fn target(&self) -> String {
        let query = encode_query(&self.query);
        if query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{query}", self.path)
        }
    }
}

fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Render a generated JSON value the way it travels in a path, query, header or cookie.
#[must_use]
pub fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Percent-encode one path segment or query component.
#[must_use]
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case() -> Case {
        let op = Operation::new(Method::Get, "/users/{id}", Vec::new(), Vec::new());
        let mut case = Case::new(Arc::new(op));
        case.path = "/users/a%20b".into();
        case.path_parameters = vec![("id".into(), "a b".into())];
        case.query = vec![("q".into(), "x&y".into()), ("n".into(), "1".into())];
        case
    }

    #[test]
    fn url_joins_base_path_and_query() {
        assert_eq!(
            case().url("http://localhost:8080/"),
            "http://localhost:8080/users/a%20b?q=x%26y&n=1"
        );
    }

    #[test]
    fn url_without_query_has_no_question_mark() {
        let mut c = case();
        c.query.clear();
        assert_eq!(c.url("http://h"), "http://h/users/a%20b");
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let mut c = case();
        assert_eq!(c.cookie_header(), None);
        c.cookies = vec![("session".into(), "abc".into()), ("theme".into(), "dark".into())];
        assert_eq!(c.cookie_header().as_deref(), Some("session=abc; theme=dark"));
    }

    #[test]
    fn display_includes_method_path_query_and_body() {
        let mut c = case();
        c.body = Some(json!({"a": 1}));
        assert_eq!(c.to_string(), r#"GET /users/a%20b?q=x%26y&n=1 {"a":1}"#);
    }

    #[test]
    fn snapshot_carries_operation_identity() {
        let snap = case().snapshot();
        assert_eq!(snap.operation.as_str(), "GET /users/{id}");
        assert_eq!(snap.method, Method::Get);
        assert_eq!(snap.path_parameters, vec![("id".to_string(), "a b".to_string())]);
        assert_eq!(snap.target(), "/users/a%20b?q=x%26y&n=1");
    }

    #[test]
    fn param_string_unquotes_strings() {
        assert_eq!(param_string(&json!("abc")), "abc");
        assert_eq!(param_string(&json!(42)), "42");
        assert_eq!(param_string(&json!(true)), "true");
        assert_eq!(param_string(&json!(null)), "");
        assert_eq!(param_string(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn encode_component_keeps_unreserved() {
        assert_eq!(encode_component("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_component("a/b c"), "a%2Fb%20c");
    }
}
