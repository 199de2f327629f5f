//! Project configuration for property-based API runs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::{FilterError, PartialFilter};

/// Project configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Schema location: file path, `file://` or `http(s)://` URI
    #[serde(default)]
    pub schema: Option<String>,

    /// Base URL of the server to test. Falls back to the server embedded in the schema.
    #[serde(default)]
    pub base_url: Option<String>,

    /// HTTP headers sent with every request (API keys, tracing ids, ...)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Check names to run; empty means every built-in check
    #[serde(default)]
    pub checks: Vec<String>,

    /// Endpoint filter values (literal or regex, classified automatically)
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Method filter values
    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub generation: GenerationSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: None,
            base_url: None,
            headers: BTreeMap::new(),
            checks: Vec::new(),
            endpoints: Vec::new(),
            methods: Vec::new(),
            auth: None,
            request_timeout: default_request_timeout(),
            generation: GenerationSettings::default(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10_000
}

/// Credentials attached to every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    #[serde(default, rename = "type")]
    pub kind: AuthType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Basic,
    Digest,
}

/// Stages of testing one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// One case built from declared examples
    Explicit,
    /// Cases with one value just outside its schema
    Boundary,
    /// Random cases
    Generate,
    /// Minimize failing cases
    Shrink,
}

impl Phase {
    pub const ALL: [Self; 4] = [Self::Explicit, Self::Boundary, Self::Generate, Self::Shrink];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Knobs for case generation and shrinking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Random cases per operation
    pub max_examples: u32,
    /// Derive the seed from the operation identity
    pub derandomize: bool,
    /// Fixed seed; wins over `derandomize`
    pub seed: Option<u64>,
    /// Replay budget when minimizing one failure
    pub max_shrinks: u32,
    pub phases: Vec<Phase>,
    pub verbosity: Verbosity,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_examples: 100,
            derandomize: false,
            seed: None,
            max_shrinks: 200,
            phases: Phase::ALL.to_vec(),
            verbosity: Verbosity::Normal,
        }
    }
}

impl GenerationSettings {
    #[must_use]
    pub fn has_phase(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from the first default location present in `dir`, or defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default(dir: &Path) -> Result<Self, ConfigError> {
        for name in DEFAULT_FILES {
            let path = dir.join(name);
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    /// Outermost filter layer. Empty lists inherit rather than clear.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownMethod`] for an invalid method name.
    pub fn filter_layer(&self) -> Result<PartialFilter, FilterError> {
        let mut layer = PartialFilter::new();
        if !self.methods.is_empty() {
            layer = layer.with_methods(&self.methods)?;
        }
        if !self.endpoints.is_empty() {
            layer = layer.with_endpoints(&self.endpoints);
        }
        Ok(layer)
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# apiprop configuration

# Schema: file path or URL
schema = "openapi.yaml"

# Server to test (defaults to the server declared in the schema)
base_url = "http://localhost:8080"

# Checks to run (default: all)
# checks = ["not_a_server_error", "status_code_conformance"]

# Only test matching operations. Values with regex metacharacters are regexes.
# endpoints = ["/users", "^/orders/\\d+"]
# methods = ["GET", "POST"]

# Per-request timeout in milliseconds
request_timeout = 10000

[headers]
# X-API-Key = "your-api-key"

# [auth]
# username = "user"
# password = "secret"
# type = "basic"

[generation]
max_examples = 100
# derandomize = true
# seed = 42
max_shrinks = 200
phases = ["explicit", "boundary", "generate", "shrink"]
verbosity = "normal"
"#
    }
}

/// File names tried by [`Config::load_default`], in order.
pub const DEFAULT_FILES: [&str; 3] = [".apiprop.toml", ".apiprop.json", "apiprop.toml"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
