//! Layered endpoint/method filters
//!
//! Filters arrive at several layers (config file, command line, per-call override).
//! Each layer is a [`PartialFilter`]; [`resolve`] merges them field by field with the
//! innermost layer winning, producing an immutable [`EffectiveFilter`].

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::catalog::{Catalog, Method, Operation};

/// One filter field at one layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Setting<T> {
    /// Not specified here: take the value from the next outer layer
    #[default]
    Inherit,
    /// Explicitly unset: drop any restriction coming from outer layers
    Clear,
    Set(T),
}

impl<T> Setting<T> {
    #[must_use]
    pub const fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }
}

/// Literal or regular-expression endpoint pattern.
#[derive(Debug, Clone)]
pub enum EndpointPattern {
    /// Matches paths equal to, or containing, the value
    Literal(String),
    /// Matches paths where the expression finds a match (case-sensitive)
    Regex(Regex),
}

/// Outcome of [`EndpointPattern::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Literal,
    Regex,
}

/// Characters that always mark a value as a regular expression.
///
/// `.` is deliberately absent: literal paths such as `/files/report.pdf` are common.
const REGEX_META: &[char] = &['\\', '^', '$', '*', '+', '?', '(', ')', '[', ']', '|'];

impl EndpointPattern {
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Explicitly tagged regex.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidRegex`] if the expression does not compile.
    pub fn regex(value: &str) -> Result<Self, FilterError> {
        Regex::new(value)
            .map(Self::Regex)
            .map_err(|source| FilterError::InvalidRegex {
                pattern: value.to_string(),
                source,
            })
    }

    /// Decide whether an untagged value is a literal path or a regex.
    ///
    /// Rules, applied in order:
    /// 1. any of `\ ^ $ * + ? ( ) [ ] |` → regex
    /// 2. `{` or `}` → literal if the value is a path template (every brace pair
    ///    encloses a non-empty parameter name), regex otherwise (`/a{2}`)
    /// 3. anything else, including `.` → literal
    #[must_use]
    pub fn classify(value: &str) -> PatternKind {
        if value.contains(REGEX_META) {
            return PatternKind::Regex;
        }
        if value.contains(['{', '}']) && !is_path_template(value) {
            return PatternKind::Regex;
        }
        PatternKind::Literal
    }

    /// Build a pattern from an untagged value using [`Self::classify`].
    ///
    /// A value classified as regex that does not compile is kept as a literal.
    #[must_use]
    pub fn from_untagged(value: &str) -> Self {
        match Self::classify(value) {
            PatternKind::Literal => Self::literal(value),
            PatternKind::Regex => Self::regex(value).unwrap_or_else(|e| {
                tracing::debug!(pattern = value, error = %e, "not a valid regex, matching literally");
                Self::literal(value)
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> PatternKind {
        match self {
            Self::Literal(_) => PatternKind::Literal,
            Self::Regex(_) => PatternKind::Regex,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Regex(r) => r.as_str(),
        }
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            // Substring covers exact equality
            Self::Literal(s) => path.contains(s.as_str()),
            Self::Regex(r) => r.is_match(path),
        }
    }
}

impl PartialEq for EndpointPattern {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.as_str() == other.as_str()
    }
}

impl fmt::Display for EndpointPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "{s}"),
            Self::Regex(r) => write!(f, "/{}/", r.as_str()),
        }
    }
}

/// `/users/{id}/posts/{post_id}` style: balanced, non-nested, non-empty names.
fn is_path_template(value: &str) -> bool {
    let mut rest = value;
    loop {
        match (rest.find('{'), rest.find('}')) {
            (None, None) => return true,
            (Some(open), Some(close)) if open < close => {
                let name = &rest[open + 1..close];
                if name.is_empty()
                    || !name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
                {
                    return false;
                }
                rest = &rest[close + 1..];
            }
            _ => return false,
        }
    }
}

/// Filter settings at a single layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialFilter {
    pub method: Setting<Vec<Method>>,
    pub endpoint: Setting<Vec<EndpointPattern>>,
}

impl PartialFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given methods (case-insensitive). An empty list clears.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownMethod`] for values that are not HTTP methods.
    pub fn with_methods<I, S>(mut self, methods: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = methods
            .into_iter()
            .map(|m| {
                let m = m.as_ref();
                Method::parse(m).ok_or_else(|| FilterError::UnknownMethod(m.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.method = if parsed.is_empty() {
            Setting::Clear
        } else {
            Setting::Set(parsed)
        };
        Ok(self)
    }

    /// Restrict to endpoints matching any of the untagged values. An empty list clears.
    #[must_use]
    pub fn with_endpoints<I, S>(self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = endpoints
            .into_iter()
            .map(|e| EndpointPattern::from_untagged(e.as_ref()))
            .collect();
        self.with_endpoint_patterns(patterns)
    }

    #[must_use]
    pub fn with_endpoint_patterns(mut self, patterns: Vec<EndpointPattern>) -> Self {
        self.endpoint = if patterns.is_empty() {
            Setting::Clear
        } else {
            Setting::Set(patterns)
        };
        self
    }

    #[must_use]
    pub fn clear_methods(mut self) -> Self {
        self.method = Setting::Clear;
        self
    }

    #[must_use]
    pub fn clear_endpoints(mut self) -> Self {
        self.endpoint = Setting::Clear;
        self
    }
}

/// Merge layers ordered outermost first. Each field takes the innermost
/// non-[`Setting::Inherit`] value; methods and endpoints resolve independently.
#[must_use]
pub fn resolve(layers: &[PartialFilter]) -> EffectiveFilter {
    EffectiveFilter {
        methods: innermost(layers.iter().map(|l| &l.method)),
        endpoints: innermost(layers.iter().map(|l| &l.endpoint)),
    }
}

fn innermost<'a, T: Clone + 'a>(
    settings: impl DoubleEndedIterator<Item = &'a Setting<Vec<T>>>,
) -> Option<Vec<T>> {
    for setting in settings.rev() {
        match setting {
            Setting::Inherit => continue,
            Setting::Clear => return None,
            Setting::Set(values) if values.is_empty() => return None,
            Setting::Set(values) => return Some(values.clone()),
        }
    }
    None
}

/// Resolved predicate over operations. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveFilter {
    methods: Option<Vec<Method>>,
    endpoints: Option<Vec<EndpointPattern>>,
}

impl EffectiveFilter {
    /// Filter that accepts every operation
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn methods(&self) -> Option<&[Method]> {
        self.methods.as_deref()
    }

    #[must_use]
    pub fn endpoints(&self) -> Option<&[EndpointPattern]> {
        self.endpoints.as_deref()
    }

    #[must_use]
    pub fn matches(&self, op: &Operation) -> bool {
        let method_ok = self
            .methods
            .as_ref()
            .is_none_or(|methods| methods.contains(&op.method));
        let endpoint_ok = self
            .endpoints
            .as_ref()
            .is_none_or(|patterns| patterns.iter().any(|p| p.matches(&op.path)));
        method_ok && endpoint_ok
    }

    /// Matching operations in catalog order.
    #[must_use]
    pub fn select(&self, catalog: &Catalog) -> Vec<Arc<Operation>> {
        catalog
            .operations()
            .iter()
            .filter(|op| self.matches(op))
            .cloned()
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),
    #[error("Invalid endpoint regex `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn op(method: Method, path: &str) -> Operation {
        Operation::new(method, path, Vec::new(), Vec::new())
    }

    fn methods(values: &[&str]) -> PartialFilter {
        PartialFilter::new().with_methods(values).unwrap()
    }

    #[test]
    fn inner_method_overrides_and_endpoint_is_inherited() {
        let outer = PartialFilter::new()
            .with_endpoints(["/foo"])
            .with_methods(["GET"])
            .unwrap();
        let inner = methods(&["POST"]);
        let effective = resolve(&[outer, inner]);

        assert_eq!(effective.methods(), Some(&[Method::Post][..]));
        assert_eq!(
            effective.endpoints(),
            Some(&[EndpointPattern::literal("/foo")][..])
        );
        assert!(effective.matches(&op(Method::Post, "/foo")));
        assert!(!effective.matches(&op(Method::Get, "/foo")));
        assert!(!effective.matches(&op(Method::Post, "/bar")));
    }

    #[test]
    fn inner_endpoint_overrides_and_method_is_inherited() {
        let outer = PartialFilter::new()
            .with_endpoints(["/foo"])
            .with_methods(["GET"])
            .unwrap();
        let inner = PartialFilter::new().with_endpoints(["/bar"]);
        let effective = resolve(&[outer, inner]);
        assert!(effective.matches(&op(Method::Get, "/bar")));
        assert!(!effective.matches(&op(Method::Get, "/foo")));
        assert!(!effective.matches(&op(Method::Post, "/bar")));
    }

    #[test]
    fn inner_clear_removes_method_constraint() {
        let outer = methods(&["POST"]);
        let inner = PartialFilter::new().clear_methods();
        let effective = resolve(&[outer, inner]);
        assert_eq!(effective.methods(), None);
        assert!(effective.matches(&op(Method::Get, "/anything")));
        assert!(effective.matches(&op(Method::Delete, "/anything")));
    }

    #[test]
    fn override_both_fields() {
        // outer: POST /v1/foo; inner: method cleared, endpoint /v1/users
        let outer = PartialFilter::new()
            .with_endpoints(["/v1/foo"])
            .with_methods(["POST"])
            .unwrap();
        let inner = PartialFilter::new()
            .clear_methods()
            .with_endpoints(["/v1/users"]);
        let effective = resolve(&[outer, inner]);
        assert!(effective.matches(&op(Method::Get, "/v1/users")));
        assert!(!effective.matches(&op(Method::Post, "/v1/foo")));
    }

    #[test]
    fn three_layers_innermost_non_inherit_wins() {
        let global = methods(&["GET"]);
        let decorator = methods(&["PUT"]);
        let call = PartialFilter::new().with_endpoints(["/x"]);
        let effective = resolve(&[global, decorator, call]);
        assert_eq!(effective.methods(), Some(&[Method::Put][..]));
    }

    #[test]
    fn empty_list_clears() {
        let outer = methods(&["GET"]);
        let inner = methods(&[]);
        assert_eq!(resolve(&[outer, inner]).methods(), None);
    }

    #[test]
    fn no_layers_accepts_everything() {
        let effective = resolve(&[]);
        assert_eq!(effective, EffectiveFilter::all());
        assert!(effective.matches(&op(Method::Trace, "/")));
    }

    #[test]
    fn method_filter_is_case_insensitive() {
        for value in ["get", "GET", "Get"] {
            let effective = resolve(&[methods(&[value])]);
            assert!(effective.matches(&op(Method::Get, "/foo")), "{value}");
            assert!(!effective.matches(&op(Method::Post, "/foo")), "{value}");
        }
    }

    #[test]
    fn unknown_method_rejected() {
        let err = PartialFilter::new().with_methods(["FETCH"]).unwrap_err();
        assert!(matches!(err, FilterError::UnknownMethod(ref m) if m == "FETCH"));
    }

    #[test]
    fn literal_endpoint_matches_by_substring() {
        let effective = resolve(&[PartialFilter::new().with_endpoints(["/foo"])]);
        assert!(effective.matches(&op(Method::Get, "/foo")));
        assert!(effective.matches(&op(Method::Get, "/v1/foo")));
        assert!(!effective.matches(&op(Method::Get, "/bar")));
    }

    #[test]
    fn regex_endpoint_matches_by_search() {
        let effective = resolve(&[PartialFilter::new().with_endpoints(["/.*oo"])]);
        assert!(effective.matches(&op(Method::Get, "/foo")));
        assert!(effective.matches(&op(Method::Get, "/zoo")));
        assert!(effective.matches(&op(Method::Get, "/v1/foo")));
        assert!(!effective.matches(&op(Method::Get, "/bar")));
    }

    #[test]
    fn regex_is_case_sensitive() {
        let effective = resolve(&[PartialFilter::new().with_endpoints(["^/Foo$"])]);
        assert!(effective.matches(&op(Method::Get, "/Foo")));
        assert!(!effective.matches(&op(Method::Get, "/foo")));
    }

    #[test]
    fn multiple_endpoints_are_ored() {
        let effective = resolve(&[PartialFilter::new().with_endpoints(["/foo", "/bar"])]);
        assert!(effective.matches(&op(Method::Get, "/foo")));
        assert!(effective.matches(&op(Method::Get, "/bar")));
        assert!(!effective.matches(&op(Method::Get, "/baz")));
    }

    #[test]
    fn classification_rules() {
        let cases = [
            ("/foo", PatternKind::Literal),
            ("/v1/foo", PatternKind::Literal),
            ("/files/report.pdf", PatternKind::Literal),
            ("/users/{id}", PatternKind::Literal),
            ("/users/{user_id}/posts/{post-id}", PatternKind::Literal),
            ("/.*oo", PatternKind::Regex),
            (r"users/\d+", PatternKind::Regex),
            ("^/health$", PatternKind::Regex),
            ("/a{2}", PatternKind::Regex),
            ("/a{2,3}", PatternKind::Regex),
            ("/x{", PatternKind::Regex),
            ("/x}", PatternKind::Regex),
            ("/(foo|bar)", PatternKind::Regex),
            ("/items?", PatternKind::Regex),
            ("/[ab]", PatternKind::Regex),
            ("/v1+", PatternKind::Regex),
        ];
        for (value, expected) in cases {
            assert_eq!(EndpointPattern::classify(value), expected, "{value}");
        }
    }

    #[test]
    fn literal_with_dot_matches_literally() {
        let pattern = EndpointPattern::from_untagged("/a.txt");
        assert_eq!(pattern.kind(), PatternKind::Literal);
        assert!(pattern.matches("/files/a.txt"));
        assert!(!pattern.matches("/files/aXtxt"));
    }

    #[test]
    fn uncompilable_regex_falls_back_to_literal() {
        let pattern = EndpointPattern::from_untagged("/broken(");
        assert_eq!(pattern.kind(), PatternKind::Literal);
        assert!(pattern.matches("/broken("));
    }

    #[test]
    fn tagged_invalid_regex_is_an_error() {
        assert!(matches!(
            EndpointPattern::regex("(unclosed"),
            Err(FilterError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn select_keeps_catalog_order() {
        let doc = serde_json::json!({
            "openapi": "3.0.0",
            "paths": {
                "/foo": {"get": {}, "post": {}},
                "/bar": {"get": {}},
                "/food": {"get": {}}
            }
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        let effective = resolve(&[methods(&["get"]).with_endpoints(["/foo"])]);
        let selected: Vec<String> = effective
            .select(&catalog)
            .iter()
            .map(|op| op.id().to_string())
            .collect();
        assert_eq!(selected, vec!["GET /foo", "GET /food"]);
    }

    proptest! {
        #[test]
        fn plain_paths_classify_as_literal(path in "/[a-z0-9_./-]{0,30}") {
            prop_assert_eq!(EndpointPattern::classify(&path), PatternKind::Literal);
        }

        #[test]
        fn literal_always_matches_itself(path in "/[a-z0-9_./-]{0,30}") {
            let pattern = EndpointPattern::from_untagged(&path);
            prop_assert!(pattern.matches(&path));
        }
    }
}
