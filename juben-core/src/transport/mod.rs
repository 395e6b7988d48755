mod reqwest_client;
mod retry;

pub use reqwest_client::ReqwestClient;
pub use retry::{is_retriable_status, RetryConfig, Sleeper, TokioSleeper, Transport};

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::error::{JubenError, JubenResult};

/// Response body as it arrives from the network, one chunk at a time.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetworkError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Connect,
    Dns,
    Reset,
    Timeout,
    Aborted,
    Interrupted,
    Request,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkErrorKind::Connect => "connect",
            NetworkErrorKind::Dns => "dns",
            NetworkErrorKind::Reset => "reset",
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Aborted => "aborted",
            NetworkErrorKind::Interrupted => "interrupted",
            NetworkErrorKind::Request => "request",
            NetworkErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A failure below the HTTP layer: no status code was obtained, or the body
/// stopped flowing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn interrupted(message: impl fmt::Display) -> Self {
        Self::new(NetworkErrorKind::Interrupted, message.to_string())
    }

    /// Client-side aborts (timeouts included) and malformed requests are final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            NetworkErrorKind::Connect
                | NetworkErrorKind::Dns
                | NetworkErrorKind::Reset
                | NetworkErrorKind::Interrupted
                | NetworkErrorKind::Other
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound request. Cheap to clone so retries can resend the same body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `payload` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> JubenResult<Self> {
        let body = serde_json::to_vec(payload)?;
        let mut request = self.header("Content-Type", "application/json");
        request.body = Some(Bytes::from(body));
        Ok(request)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The JSON body, if one was set and it parses.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

/// A response whose status is known and whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    reason: Option<String>,
    body: Option<ByteStream>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl HttpResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self {
            status,
            reason: None,
            body: Some(body),
        }
    }

    pub fn without_body(status: u16) -> Self {
        Self {
            status,
            reason: None,
            body: None,
        }
    }

    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        Self::from_chunks(status, vec![Ok(body.into())])
    }

    pub fn from_chunks(status: u16, chunks: Vec<Result<Bytes, NetworkError>>) -> Self {
        Self::new(status, Box::pin(futures::stream::iter(chunks)))
    }

    pub fn with_reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(|r| r.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `"404 Not Found"`, or just the code when no reason phrase is known.
    pub fn status_text(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} {}", self.status, reason),
            None => self.status.to_string(),
        }
    }

    pub fn take_body(&mut self) -> Option<ByteStream> {
        self.body.take()
    }

    pub async fn bytes(mut self) -> Result<Vec<u8>, NetworkError> {
        let mut collected = Vec::new();
        if let Some(mut body) = self.body.take() {
            while let Some(chunk) = body.next().await {
                collected.extend_from_slice(&chunk?);
            }
        }
        Ok(collected)
    }

    pub async fn text(self) -> Result<String, NetworkError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> JubenResult<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| JubenError::ApiParseError(e.to_string()))
    }
}

/// The network seam. Production code uses [`ReqwestClient`]; tests script
/// responses without opening sockets.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send the request and resolve once the status line and headers are in.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError>;
}
