//! HTTP seam: endpoint descriptors, requests, responses and the transport trait
//!
//! The engine only needs a status code, an optional validator (`ETag`) and a
//! body back from the collaborating HTTP layer. [`HttpTransport`] provides that
//! over `reqwest`; tests and embedders can plug in their own [`Transport`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Standard request headers sent on every poll.
pub mod headers {
    /// `Accept`
    pub const ACCEPT: &str = "Accept";
    /// `Cache-Control`
    pub const CACHE_CONTROL: &str = "Cache-Control";
    /// `If-None-Match`
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    /// JSON media type
    pub const APPLICATION_JSON: &str = "application/json";
    /// Disable intermediary caching
    pub const NO_CACHE: &str = "no-cache";
}

/// HTTP status signalling "no change since the validator".
pub const NOT_MODIFIED: u16 = 304;

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Where and how to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Absolute URL
    pub url: String,
    /// HTTP method
    #[serde(default)]
    pub method: Method,
    /// Optional JSON body
    #[serde(default)]
    pub body: Option<Value>,
}

impl Endpoint {
    /// `GET` endpoint.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            body: None,
        }
    }

    /// Endpoint with an explicit method and optional JSON body.
    pub fn new(url: impl Into<String>, method: Method, body: Option<Value>) -> Self {
        Self {
            url: url.into(),
            method,
            body,
        }
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Self::get(url)
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Self::get(url)
    }
}

/// One outbound request.
#[derive(Debug, Clone)]
pub struct PollRequest {
    /// Session key the request belongs to
    pub key: String,
    /// Target endpoint
    pub endpoint: Endpoint,
    /// Headers to send, in order
    pub headers: Vec<(String, String)>,
    /// Cancelled when the attempt is superseded, stopped or timed out
    pub signal: CancellationToken,
}

impl PollRequest {
    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response handed back by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResponse {
    /// HTTP status code
    pub status: u16,
    /// Response validator (`ETag`)
    pub validator: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

impl PollResponse {
    /// 2xx response with a JSON body.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        Self {
            status: 200,
            validator: None,
            body: value.to_string().into_bytes(),
        }
    }

    /// Empty 304 response.
    #[must_use]
    pub const fn not_modified() -> Self {
        Self {
            status: NOT_MODIFIED,
            validator: None,
            body: Vec::new(),
        }
    }

    /// Empty response with an arbitrary status.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self {
            status,
            validator: None,
            body: Vec::new(),
        }
    }

    /// Attach a validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or I/O failure
    #[error("request failed: {0}")]
    Request(String),

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Sends poll requests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one request and return the raw response.
    async fn send(&self, request: PollRequest) -> Result<PollResponse, TransportError>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use reqwest::header::{CONTENT_TYPE, ETAG};

    use super::{Method, PollRequest, PollResponse, Transport, TransportError, headers};

    /// `reqwest`-backed transport.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        /// Transport with a default client.
        pub fn new() -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| TransportError::InvalidRequest(format!("failed to build client: {e}")))?;
            Ok(Self { client })
        }

        /// Transport around an existing client.
        #[must_use]
        pub const fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    const fn to_reqwest(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(&self, request: PollRequest) -> Result<PollResponse, TransportError> {
            let mut builder = self
                .client
                .request(to_reqwest(request.endpoint.method), &request.endpoint.url);

            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            if let Some(body) = &request.endpoint.body {
                let bytes = serde_json::to_vec(body)
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                builder = builder
                    .header(CONTENT_TYPE, headers::APPLICATION_JSON)
                    .body(bytes);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            let status = response.status().as_u16();
            let validator = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?
                .to_vec();

            Ok(PollResponse {
                status,
                validator,
                body,
            })
        }
    }
}
