//! Loading schema documents from files, URIs or memory

use std::path::{Path, PathBuf};
use std::time::Duration;

use apiprop_core::catalog::{Catalog, CatalogError};
use serde_json::Value;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unsupported schema type")]
    UnsupportedSchemaType,
    #[error("Schema parse error: {0}")]
    SchemaParse(String),
    #[error("Cannot load {location}: {reason}")]
    ResourceUnavailable { location: String, reason: String },
}

impl From<CatalogError> for LoadError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::UnsupportedSchemaType => Self::UnsupportedSchemaType,
            CatalogError::SchemaParse(msg) => Self::SchemaParse(msg),
        }
    }
}

/// Where a schema comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSource {
    Document(Value),
    Path(PathBuf),
    Uri(Url),
}

impl SchemaSource {
    /// `http://`, `https://` and `file://` are URIs, anything else is a file path.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ResourceUnavailable`] for a malformed URI.
    pub fn parse(location: &str) -> Result<Self, LoadError> {
        let unavailable = |reason: String| LoadError::ResourceUnavailable {
            location: location.to_string(),
            reason,
        };
        if ["http://", "https://", "file://"]
            .iter()
            .any(|scheme| location.starts_with(scheme))
        {
            return Url::parse(location)
                .map(Self::Uri)
                .map_err(|e| unavailable(e.to_string()));
        }
        Ok(Self::Path(PathBuf::from(location)))
    }
}

/// Load and normalize a schema.
///
/// # Errors
///
/// See [`load_document`] and [`Catalog::from_document`].
pub fn load(source: &SchemaSource) -> Result<Catalog, LoadError> {
    let doc = load_document(source)?;
    let catalog = Catalog::from_document(&doc)?;
    tracing::info!(operations = catalog.len(), "schema loaded");
    Ok(catalog)
}

/// Read a schema into a JSON value without normalizing it.
///
/// # Errors
///
/// - [`LoadError::ResourceUnavailable`] if the file or URI cannot be read
/// - [`LoadError::SchemaParse`] if the content is neither JSON nor YAML
pub fn load_document(source: &SchemaSource) -> Result<Value, LoadError> {
    match source {
        SchemaSource::Document(doc) => Ok(doc.clone()),
        SchemaSource::Path(path) => read_file(path),
        SchemaSource::Uri(url) if url.scheme() == "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| LoadError::ResourceUnavailable {
                    location: url.to_string(),
                    reason: "not a local file path".into(),
                })?;
            read_file(&path)
        }
        SchemaSource::Uri(url) => {
            tracing::debug!(url = %url, "fetching schema");
            let content = fetch(url)?;
            parse_document(extension(Path::new(url.path())).as_deref(), &content)
        }
    }
}

fn read_file(path: &Path) -> Result<Value, LoadError> {
    tracing::debug!(path = %path.display(), "reading schema");
    let content = std::fs::read_to_string(path).map_err(|e| LoadError::ResourceUnavailable {
        location: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_document(extension(path).as_deref(), &content)
}

fn fetch(url: &Url) -> Result<String, LoadError> {
    let unavailable = |reason: String| LoadError::ResourceUnavailable {
        location: url.to_string(),
        reason,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| unavailable(e.to_string()))?;
    let resp = client
        .get(url.as_str())
        .send()
        .map_err(|e| unavailable(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(unavailable(format!("HTTP {status}")));
    }
    resp.text().map_err(|e| unavailable(e.to_string()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Parse by extension (`yaml`/`yml`/`json`), else sniff: a leading `{` is
/// JSON, anything else YAML.
fn parse_document(extension: Option<&str>, content: &str) -> Result<Value, LoadError> {
    let json = |content: &str| -> Result<Value, LoadError> {
        serde_json::from_str(content)
            .map_err(|e| LoadError::SchemaParse(format!("Invalid JSON: {e}")))
    };
    let yaml = |content: &str| -> Result<Value, LoadError> {
        serde_yml::from_str(content)
            .map_err(|e| LoadError::SchemaParse(format!("Invalid YAML: {e}")))
    };
    match extension {
        Some("yaml" | "yml") => yaml(content),
        Some("json") => json(content),
        _ if content.trim_start().starts_with('{') => json(content),
        _ => yaml(content),
    }
}
