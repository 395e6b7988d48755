use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method};

use crate::error::{JubenError, JubenResult};

use super::{HttpClient, HttpMethod, HttpRequest, HttpResponse, NetworkError, NetworkErrorKind};

/// [`HttpClient`] backed by `reqwest`.
///
/// The timeout bounds the wait for response headers only; a streamed body
/// may take as long as the agent needs.
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
    timeout: Duration,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> JubenResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| JubenError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_builder() {
            NetworkErrorKind::Request
        } else if err.is_connect() {
            if mentions_dns(&err) {
                NetworkErrorKind::Dns
            } else {
                NetworkErrorKind::Connect
            }
        } else if err.is_body() || err.is_decode() {
            NetworkErrorKind::Interrupted
        } else if err.is_request() {
            NetworkErrorKind::Reset
        } else {
            NetworkErrorKind::Other
        };

        NetworkError::new(kind, err.to_string())
    }
}

fn mentions_dns(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_lowercase();
        if text.contains("dns") || text.contains("resolve") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let mut builder = self
            .client
            .request(Method::from(request.method), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let timeout = request.timeout.unwrap_or(self.timeout);
        let response = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| {
                NetworkError::new(
                    NetworkErrorKind::Timeout,
                    format!("no response within {} ms", timeout.as_millis()),
                )
            })??;

        let status = response.status();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| NetworkError::interrupted(e)));

        Ok(HttpResponse::new(status.as_u16(), Box::pin(body)).with_reason(status.canonical_reason()))
    }
}
