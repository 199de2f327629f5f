//! Sending cases over HTTP

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use apiprop_core::catalog::Method;
use apiprop_core::config::{AuthConfig, AuthType};
use apiprop_core::Case;
use serde_json::Value;

use crate::checks::Response;

/// A fully resolved request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Absolute URL including the encoded query
    pub url: String,
    /// Config headers, then generated header parameters, then `Cookie`
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    #[must_use]
    pub fn from_case(
        case: &Case,
        base_url: &str,
        default_headers: &BTreeMap<String, String>,
    ) -> Self {
        let mut headers: Vec<(String, String)> = default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.extend(case.headers.iter().cloned());
        if let Some(cookie) = case.cookie_header() {
            headers.push(("Cookie".into(), cookie));
        }
        Self {
            method: case.method(),
            url: case.url(base_url),
            headers,
            body: case.body.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Sends one request and waits for the whole response.
pub trait Transport {
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was received.
    fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request)
    }
}

/// Blocking `reqwest` transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    auth: Option<AuthConfig>,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::Unsupported`] for digest auth and
    /// [`TransportError::InvalidRequest`] if the client cannot be built.
    pub fn new(timeout: Duration, auth: Option<&AuthConfig>) -> Result<Self, TransportError> {
        if auth.is_some_and(|a| a.kind == AuthType::Digest) {
            return Err(TransportError::Unsupported(
                "digest authentication".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            client,
            auth: auth.cloned(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut req = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            // Values with control characters never reach a server.
            if reqwest::header::HeaderValue::from_str(v).is_ok() {
                req = req.header(k, v);
            } else {
                tracing::debug!(header = %k, "skipping invalid header value");
            }
        }
        if let Some(auth) = &self.auth {
            req = req.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let start = Instant::now();
        let resp = req.send().map_err(classify)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = resp.text().map_err(classify)?;

        Ok(Response {
            status,
            headers,
            body,
            elapsed: start.elapsed(),
        })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Connection(e.to_string())
    }
}
