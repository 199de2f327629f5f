//! Operation catalog: OpenAPI 2/3 document → ordered list of operations
//!
//! Parsing is pure. Loading from files or URIs lives in `apiprop-runner`.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Maximum `$ref` nesting followed while resolving schemas.
const MAX_REF_DEPTH: u32 = 20;

/// Swagger 2 parameter keys that describe the parameter, not its value.
const SWAGGER_PARAM_META: &[&str] = &[
    "name",
    "in",
    "required",
    "description",
    "allowEmptyValue",
    "collectionFormat",
];

/// HTTP method of an operation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl Method {
    pub const ALL: [Self; 8] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
        Self::Trace,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Trace => "TRACE",
        }
    }

    /// Case-insensitive lookup. Returns `None` for anything that is not an HTTP method
    /// key of an OpenAPI path item.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter travels in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl Location {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "body" => Some(Self::Body),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input slot of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: Location,
    pub required: bool,
    /// Value schema with every resolvable `$ref` inlined
    pub schema: Value,
    /// Explicit example declared on the parameter or its schema
    pub example: Option<Value>,
}

impl Parameter {
    /// `nullable: true` (OpenAPI 3.0), `x-nullable: true` (Swagger 2) or a `null`
    /// member in a `type` array (OpenAPI 3.1).
    #[must_use]
    pub fn nullable(&self) -> bool {
        is_nullable(&self.schema)
    }
}

/// Whether a schema admits `null`.
pub fn is_nullable(schema: &Value) -> bool {
    let flag = |key: &str| schema.get(key).and_then(Value::as_bool).unwrap_or(false);
    flag("nullable")
        || flag("x-nullable")
        || schema
            .get("type")
            .and_then(Value::as_array)
            .is_some_and(|types| types.iter().any(|t| t == "null"))
}

/// Operation identity: `"METHOD /path"`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self(format!("{method} {path}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response status key as written in the `responses` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKey {
    Code(u16),
    /// `"4XX"` style range, holding the leading digit
    Range(u8),
    Default,
}

impl StatusKey {
    fn parse(key: &str) -> Option<Self> {
        if key == "default" {
            return Some(Self::Default);
        }
        if let Ok(code) = key.parse::<u16>() {
            return Some(Self::Code(code));
        }
        let bytes = key.as_bytes();
        if bytes.len() == 3 && bytes[0].is_ascii_digit() && key[1..].eq_ignore_ascii_case("xx") {
            return Some(Self::Range(bytes[0] - b'0'));
        }
        None
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Range(digit) => write!(f, "{digit}XX"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// A declared response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSpec {
    pub status: StatusKey,
    pub content_types: Vec<String>,
    /// JSON body schema (resolved), if declared
    pub schema: Option<Value>,
}

/// One (method, path) entry of the schema. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    id: OperationId,
    pub method: Method,
    /// Base path + path template, e.g. `/v1/users/{id}`
    pub path: String,
    pub parameters: Vec<Parameter>,
    pub responses: Vec<ResponseSpec>,
}

impl Operation {
    #[must_use]
    pub fn new(
        method: Method,
        path: impl Into<String>,
        parameters: Vec<Parameter>,
        responses: Vec<ResponseSpec>,
    ) -> Self {
        let path = path.into();
        Self {
            id: OperationId::new(method, &path),
            method,
            path,
            parameters,
            responses,
        }
    }

    #[must_use]
    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn parameters_in(&self, location: Location) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }

    #[must_use]
    pub fn body(&self) -> Option<&Parameter> {
        self.parameters_in(Location::Body).next()
    }

    /// Declared response matching `status`: exact code, then `NXX` range, then `default`.
    #[must_use]
    pub fn response_for(&self, status: u16) -> Option<&ResponseSpec> {
        let digit = u8::try_from(status / 100).ok();
        self.responses
            .iter()
            .find(|r| r.status == StatusKey::Code(status))
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|r| digit.is_some_and(|d| r.status == StatusKey::Range(d)))
            })
            .or_else(|| self.responses.iter().find(|r| r.status == StatusKey::Default))
    }
}

/// Schema dialect the catalog was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SpecVersion {
    Swagger2,
    OpenApi3,
}

/// Normalized, ordered operations of one schema document.
#[derive(Debug, Clone)]
pub struct Catalog {
    operations: Vec<Arc<Operation>>,
    version: SpecVersion,
    base_path: String,
    server_origin: Option<String>,
}

impl Catalog {
    /// Build the catalog from a parsed document.
    ///
    /// Operations keep document order: paths as written, and methods in the order
    /// they appear inside each path item.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::UnsupportedSchemaType`] if `doc` is not a mapping carrying
    ///   `openapi`, `swagger` or `paths`
    /// - [`CatalogError::SchemaParse`] if the `paths` section is missing or malformed
    pub fn from_document(doc: &Value) -> Result<Self, CatalogError> {
        let root = doc.as_object().ok_or(CatalogError::UnsupportedSchemaType)?;
        let version = if root.contains_key("swagger") {
            SpecVersion::Swagger2
        } else if root.contains_key("openapi") || root.contains_key("paths") {
            SpecVersion::OpenApi3
        } else {
            return Err(CatalogError::UnsupportedSchemaType);
        };

        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| CatalogError::SchemaParse("document has no `paths` object".into()))?;

        let (base_path, server_origin) = match version {
            SpecVersion::Swagger2 => swagger_location(root),
            SpecVersion::OpenApi3 => openapi_location(root),
        };

        let resolver = RefResolver { root: doc };
        let mut operations = Vec::new();

        for (template, raw_item) in paths {
            let item = resolver.resolve(raw_item);
            let Some(item) = item.as_object() else {
                return Err(CatalogError::SchemaParse(format!(
                    "path item `{template}` is not an object"
                )));
            };
            let full_path = format!("{base_path}{template}");
            let shared = parse_parameters(item.get("parameters"), &resolver, version, &full_path)?;

            for (key, raw_op) in item {
                let Some(method) = Method::parse(key) else {
                    continue;
                };
                let Some(op) = raw_op.as_object() else {
                    return Err(CatalogError::SchemaParse(format!(
                        "{method} {full_path}: operation is not an object"
                    )));
                };
                let label = format!("{method} {full_path}");

                let mut parameters = shared.clone();
                for param in parse_parameters(op.get("parameters"), &resolver, version, &label)? {
                    match parameters
                        .iter_mut()
                        .find(|p| p.name == param.name && p.location == param.location)
                    {
                        Some(existing) => *existing = param,
                        None => parameters.push(param),
                    }
                }
                if version == SpecVersion::OpenApi3 {
                    if let Some(body) = op
                        .get("requestBody")
                        .and_then(|rb| parse_request_body(rb, &resolver))
                    {
                        parameters.push(body);
                    }
                }

                let responses = parse_responses(root, op, &resolver, version);
                operations.push(Arc::new(Operation::new(
                    method,
                    full_path.clone(),
                    parameters,
                    responses,
                )));
            }
        }

        tracing::debug!(
            operations = operations.len(),
            base_path = %base_path,
            "catalog built"
        );

        Ok(Self {
            operations,
            version,
            base_path,
            server_origin,
        })
    }

    #[must_use]
    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    #[must_use]
    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// Path prefix applied to every operation (`basePath` or the path of `servers[0]`)
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Absolute `scheme://host[:port]` embedded in the schema, if any.
    #[must_use]
    pub fn server_origin(&self) -> Option<&str> {
        self.server_origin.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Unsupported schema type")]
    UnsupportedSchemaType,
    #[error("Schema parse error: {0}")]
    SchemaParse(String),
}

fn swagger_location(root: &Map<String, Value>) -> (String, Option<String>) {
    let base_path = root
        .get("basePath")
        .and_then(Value::as_str)
        .map(normalize_base_path)
        .unwrap_or_default();
    let origin = root.get("host").and_then(Value::as_str).map(|host| {
        let scheme = root
            .get("schemes")
            .and_then(Value::as_array)
            .and_then(|s| s.first())
            .and_then(Value::as_str)
            .unwrap_or("http");
        format!("{scheme}://{host}")
    });
    (base_path, origin)
}

fn openapi_location(root: &Map<String, Value>) -> (String, Option<String>) {
    let Some(server) = root
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
    else {
        return (String::new(), None);
    };
    let Some(raw_url) = server.get("url").and_then(Value::as_str) else {
        return (String::new(), None);
    };

    // Substitute server variables with their defaults
    let mut url = raw_url.to_string();
    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            if let Some(default) = var.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }

    match url.find("://") {
        Some(idx) => {
            let after_scheme = idx + 3;
            let path_start = url[after_scheme..]
                .find('/')
                .map_or(url.len(), |p| after_scheme + p);
            (
                normalize_base_path(&url[path_start..]),
                Some(url[..path_start].to_string()),
            )
        }
        None => (normalize_base_path(&url), None),
    }
}

/// `"/v1/"` → `"/v1"`, `"/"` → `""`, `"v1"` → `"/v1"`
fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_parameters(
    list: Option<&Value>,
    resolver: &RefResolver,
    version: SpecVersion,
    label: &str,
) -> Result<Vec<Parameter>, CatalogError> {
    let Some(list) = list else {
        return Ok(Vec::new());
    };
    let Some(items) = list.as_array() else {
        return Err(CatalogError::SchemaParse(format!(
            "{label}: `parameters` is not a list"
        )));
    };

    let mut parameters = Vec::with_capacity(items.len());
    for (idx, raw) in items.iter().enumerate() {
        let param = resolver.resolve(raw);
        let (Some(name), Some(location)) = (
            param.get("name").and_then(Value::as_str),
            param.get("in").and_then(Value::as_str),
        ) else {
            return Err(CatalogError::SchemaParse(format!(
                "{label}: parameter #{idx} lacks `name` or `in`"
            )));
        };
        let Some(location) = Location::parse(location) else {
            tracing::debug!(%label, name, location, "skipping unsupported parameter location");
            continue;
        };

        let schema = match (version, location) {
            (SpecVersion::Swagger2, Location::Body) | (SpecVersion::OpenApi3, _) => param
                .get("schema")
                .map(|s| resolver.resolve(s))
                .unwrap_or_else(|| json!({"type": "string"})),
            (SpecVersion::Swagger2, _) => {
                let mut schema = param.as_object().cloned().unwrap_or_default();
                for key in SWAGGER_PARAM_META {
                    schema.remove(*key);
                }
                if !schema.contains_key("type") {
                    schema.insert("type".into(), json!("string"));
                }
                resolver.resolve(&Value::Object(schema))
            }
        };

        let required = location == Location::Path
            || param.get("required").and_then(Value::as_bool).unwrap_or(false);
        let example = param
            .get("example")
            .or_else(|| {
                param
                    .get("examples")
                    .and_then(Value::as_object)
                    .and_then(|ex| ex.values().next())
                    .and_then(|ex| ex.get("value"))
            })
            .or_else(|| schema.get("example"))
            .cloned();

        parameters.push(Parameter {
            name: name.to_string(),
            location,
            required,
            schema,
            example,
        });
    }
    Ok(parameters)
}

fn parse_request_body(raw: &Value, resolver: &RefResolver) -> Option<Parameter> {
    let body = resolver.resolve(raw);
    let content = body.get("content")?.as_object()?;
    let media = content
        .get("application/json")
        .or_else(|| content.values().next())?;
    let schema = media
        .get("schema")
        .map(|s| resolver.resolve(s))
        .unwrap_or_else(|| json!({}));
    let example = media.get("example").or_else(|| schema.get("example")).cloned();
    Some(Parameter {
        name: "body".into(),
        location: Location::Body,
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        schema,
        example,
    })
}

fn parse_responses(
    root: &Map<String, Value>,
    op: &Map<String, Value>,
    resolver: &RefResolver,
    version: SpecVersion,
) -> Vec<ResponseSpec> {
    let Some(responses) = op.get("responses").and_then(Value::as_object) else {
        return Vec::new();
    };
    let produces: Vec<String> = op
        .get("produces")
        .or_else(|| root.get("produces"))
        .and_then(Value::as_array)
        .map(|p| p.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let mut specs = Vec::new();
    for (key, raw) in responses {
        let Some(status) = StatusKey::parse(key) else {
            continue;
        };
        let response = resolver.resolve(raw);
        let (content_types, schema) = match version {
            SpecVersion::OpenApi3 => {
                let content = response.get("content").and_then(Value::as_object);
                let types = content
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default();
                let schema = content
                    .and_then(|c| c.get("application/json"))
                    .and_then(|m| m.get("schema"))
                    .cloned();
                (types, schema)
            }
            SpecVersion::Swagger2 => {
                let schema = response.get("schema").cloned();
                let types = if schema.is_some() {
                    produces.clone()
                } else {
                    Vec::new()
                };
                (types, schema)
            }
        };
        specs.push(ResponseSpec {
            status,
            content_types,
            schema,
        });
    }
    specs
}

/// Inlines `$ref` pointers against the whole document.
struct RefResolver<'a> {
    root: &'a Value,
}

impl RefResolver<'_> {
    fn resolve(&self, value: &Value) -> Value {
        let mut stack = Vec::new();
        self.resolve_inner(value, &mut stack, 0)
    }

    fn resolve_inner<'v>(&'v self, value: &'v Value, stack: &mut Vec<&'v str>, depth: u32) -> Value {
        if depth > MAX_REF_DEPTH {
            return value.clone();
        }
        match value {
            Value::Object(obj) => {
                if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                    // A reference already being expanded is a cycle: cut it with an open schema
                    if stack.contains(&reference) {
                        return json!({});
                    }
                    let Some(target) = self.lookup(reference) else {
                        return value.clone();
                    };
                    stack.push(reference);
                    let resolved = self.resolve_inner(target, stack, depth + 1);
                    stack.pop();
                    return resolved;
                }
                Value::Object(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), self.resolve_inner(v, stack, depth + 1)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_inner(v, stack, depth + 1))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    fn lookup(&self, reference: &str) -> Option<&Value> {
        reference
            .strip_prefix('#')
            .and_then(|pointer| self.root.pointer(pointer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(catalog: &Catalog) -> Vec<String> {
        catalog
            .operations()
            .iter()
            .map(|op| op.id().to_string())
            .collect()
    }

    #[test]
    fn one_operation_per_path_method_in_document_order() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {
                "/zeta": {
                    "post": {"responses": {"200": {"description": "OK"}}},
                    "get": {"responses": {"200": {"description": "OK"}}},
                    "summary": "not a method"
                },
                "/alpha": {
                    "delete": {},
                    "parameters": []
                }
            }
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        assert_eq!(
            labels(&catalog),
            vec!["POST /zeta", "GET /zeta", "DELETE /alpha"]
        );
    }

    #[test]
    fn identical_documents_yield_identical_order() {
        let doc = json!({
            "swagger": "2.0",
            "paths": {
                "/b": {"get": {}, "put": {}},
                "/a": {"patch": {}}
            }
        });
        let first = labels(&Catalog::from_document(&doc).unwrap());
        let second = labels(&Catalog::from_document(&doc).unwrap());
        assert_eq!(first, second);
        assert_eq!(first, vec!["GET /b", "PUT /b", "PATCH /a"]);
    }

    #[test]
    fn empty_mapping_is_unsupported() {
        let err = Catalog::from_document(&json!({})).unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedSchemaType));
        assert_eq!(err.to_string(), "Unsupported schema type");
    }

    #[test]
    fn non_mapping_is_unsupported() {
        for doc in [json!([1, 2]), json!("openapi"), json!(null)] {
            assert!(matches!(
                Catalog::from_document(&doc),
                Err(CatalogError::UnsupportedSchemaType)
            ));
        }
    }

    #[test]
    fn missing_paths_is_parse_error() {
        let err = Catalog::from_document(&json!({"openapi": "3.0.0", "info": {}})).unwrap_err();
        assert!(matches!(err, CatalogError::SchemaParse(_)));
    }

    #[test]
    fn path_and_operation_parameters_are_merged() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {
                "/users/{id}": {
                    "parameters": [
                        {"name": "id", "in": "path", "schema": {"type": "string"}},
                        {"name": "trace", "in": "header", "schema": {"type": "string"}}
                    ],
                    "get": {
                        "parameters": [
                            {"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}},
                            {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                        ]
                    }
                }
            }
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        let op = &catalog.operations()[0];
        let names: Vec<&str> = op.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "trace", "verbose"]);
        // operation-level definition replaces the path-level one in place
        assert_eq!(op.parameters[0].schema, json!({"type": "integer"}));
        assert!(op.parameters[0].required);
        assert!(!op.parameters[2].required);
    }

    #[test]
    fn path_parameters_are_always_required() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {"/items/{id}": {"get": {"parameters": [{"name": "id", "in": "path"}]}}}
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        let param = &catalog.operations()[0].parameters[0];
        assert!(param.required);
        assert_eq!(param.schema, json!({"type": "string"}));
    }

    #[test]
    fn parameter_without_name_is_parse_error() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {"/x": {"get": {"parameters": [{"in": "query"}]}}}
        });
        assert!(matches!(
            Catalog::from_document(&doc),
            Err(CatalogError::SchemaParse(_))
        ));
    }

    #[test]
    fn swagger2_base_path_params_and_body() {
        let doc = json!({
            "swagger": "2.0",
            "host": "api.example.com:8443",
            "schemes": ["https"],
            "basePath": "/v1/",
            "paths": {
                "/foo": {
                    "post": {
                        "parameters": [
                            {"name": "id", "in": "query", "required": true, "type": "integer",
                             "minimum": 0, "maximum": 100, "description": "the id"},
                            {"name": "payload", "in": "body", "schema": {"$ref": "#/definitions/Payload"}},
                            {"name": "upload", "in": "formData", "type": "file"}
                        ]
                    }
                }
            },
            "definitions": {
                "Payload": {"type": "object", "properties": {"name": {"type": "string"}}}
            }
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        assert_eq!(catalog.version(), SpecVersion::Swagger2);
        assert_eq!(catalog.base_path(), "/v1");
        assert_eq!(catalog.server_origin(), Some("https://api.example.com:8443"));

        let op = &catalog.operations()[0];
        assert_eq!(op.path, "/v1/foo");
        assert_eq!(op.id().as_str(), "POST /v1/foo");
        assert_eq!(op.parameters.len(), 2, "formData is skipped");
        assert_eq!(
            op.parameters[0].schema,
            json!({"type": "integer", "minimum": 0, "maximum": 100})
        );
        let body = op.body().unwrap();
        assert_eq!(body.name, "payload");
        assert_eq!(body.schema["properties"]["name"], json!({"type": "string"}));
    }

    #[test]
    fn openapi3_request_body_and_servers() {
        let doc = json!({
            "openapi": "3.0.3",
            "servers": [{"url": "https://{env}.example.com/api/", "variables": {"env": {"default": "staging"}}}],
            "paths": {
                "/orders": {
                    "post": {
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Order"}}}
                        },
                        "responses": {
                            "201": {"content": {"application/json": {"schema": {"type": "object"}}}},
                            "4XX": {"description": "client error"},
                            "default": {"description": "anything"}
                        }
                    }
                }
            },
            "components": {
                "schemas": {"Order": {"type": "object", "required": ["qty"], "properties": {"qty": {"type": "integer"}}}}
            }
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        assert_eq!(catalog.base_path(), "/api");
        assert_eq!(catalog.server_origin(), Some("https://staging.example.com"));

        let op = &catalog.operations()[0];
        assert_eq!(op.path, "/api/orders");
        let body = op.body().unwrap();
        assert!(body.required);
        assert_eq!(body.schema["required"], json!(["qty"]));

        assert_eq!(op.response_for(201).unwrap().status, StatusKey::Code(201));
        assert_eq!(
            op.response_for(201).unwrap().content_types,
            vec!["application/json".to_string()]
        );
        assert_eq!(op.response_for(404).unwrap().status, StatusKey::Range(4));
        assert_eq!(op.response_for(500).unwrap().status, StatusKey::Default);
    }

    #[test]
    fn relative_server_url_sets_base_path_only() {
        let doc = json!({
            "openapi": "3.0.0",
            "servers": [{"url": "/v2"}],
            "paths": {"/ping": {"get": {}}}
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        assert_eq!(catalog.base_path(), "/v2");
        assert_eq!(catalog.server_origin(), None);
        assert_eq!(catalog.operations()[0].path, "/v2/ping");
    }

    #[test]
    fn parameter_refs_are_resolved() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {"/x": {"get": {"parameters": [{"$ref": "#/components/parameters/Limit"}]}}},
            "components": {
                "parameters": {
                    "Limit": {"name": "limit", "in": "query", "example": 5,
                              "schema": {"$ref": "#/components/schemas/Small"}}
                },
                "schemas": {"Small": {"type": "integer", "maximum": 10}}
            }
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        let param = &catalog.operations()[0].parameters[0];
        assert_eq!(param.name, "limit");
        assert_eq!(param.location, Location::Query);
        assert_eq!(param.schema, json!({"type": "integer", "maximum": 10}));
        assert_eq!(param.example, Some(json!(5)));
    }

    #[test]
    fn cyclic_refs_are_cut() {
        let doc = json!({
            "openapi": "3.0.0",
            "paths": {"/tree": {"post": {"requestBody": {"content": {"application/json": {
                "schema": {"$ref": "#/components/schemas/Node"}}}}}}},
            "components": {"schemas": {"Node": {
                "type": "object",
                "properties": {"child": {"$ref": "#/components/schemas/Node"}}
            }}}
        });
        let catalog = Catalog::from_document(&doc).unwrap();
        let body = catalog.operations()[0].body().unwrap();
        assert_eq!(body.schema["properties"]["child"], json!({}));
    }

    #[test]
    fn nullable_flags() {
        let param = |schema: Value| Parameter {
            name: "p".into(),
            location: Location::Query,
            required: false,
            schema,
            example: None,
        };
        assert!(param(json!({"type": "string", "nullable": true})).nullable());
        assert!(param(json!({"type": "string", "x-nullable": true})).nullable());
        assert!(param(json!({"type": ["string", "null"]})).nullable());
        assert!(!param(json!({"type": "string"})).nullable());
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("PaTcH"), Some(Method::Patch));
        assert_eq!(Method::parse("parameters"), None);
    }
}
