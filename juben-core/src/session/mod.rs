//! The client's front door: send a message and pull its events, plus the
//! one-shot calls for agents, status and server-side sessions.

mod chat_stream;

pub use chat_stream::{ChatStream, Completion, ErrorPolicy, SessionState};

use std::sync::Arc;

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::JubenConfig;
use crate::error::{JubenError, JubenResult};
use crate::identity::{FileStore, IdentityStore, KeyValueStore, MemoryStore};
use crate::metrics::PerformanceMonitor;
use crate::models::{
    validate_chat_input, AgentInfo, ChatOptions, ChatRequest, CreateSessionResponse,
    CreatedSession, ExportRequest, ExportResult, HealthStatus, SessionInfo, SystemStatus,
};
use crate::transport::{
    HttpClient, HttpRequest, HttpResponse, ReqwestClient, RetryConfig, Sleeper, Transport,
};

const ERROR_BODY_PREVIEW: usize = 200;

/// Everything a [`SessionController`] needs, built once by the owner and
/// dropped with it.
pub struct ClientContext {
    config: JubenConfig,
    identity: Arc<IdentityStore>,
    monitor: Arc<PerformanceMonitor>,
    transport: Transport,
}

impl ClientContext {
    pub fn new(
        config: JubenConfig,
        identity: Arc<IdentityStore>,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        let monitor = Arc::new(PerformanceMonitor::with_capacity(config.metrics.capacity));
        let transport = Transport::new(
            client,
            RetryConfig::from_api_config(&config.api),
            monitor.clone(),
        );

        Self {
            config,
            identity,
            monitor,
            transport,
        }
    }

    /// Production wiring: reqwest for HTTP, the identity file from the
    /// storage config (in memory when no data directory is known).
    pub fn from_config(config: &JubenConfig) -> JubenResult<Self> {
        let client = ReqwestClient::new(config.api.request_timeout())?;

        let store: Arc<dyn KeyValueStore> = match config.storage.resolved_path() {
            Some(path) => {
                debug!(path = %path.display(), "Using file identity store");
                Arc::new(FileStore::new(path))
            }
            None => Arc::new(MemoryStore::new()),
        };

        Ok(Self::new(
            config.clone(),
            Arc::new(IdentityStore::new(store)),
            Arc::new(client),
        ))
    }

    /// Replace how retries wait; tests record delays instead of sleeping.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.transport = self.transport.with_sleeper(sleeper);
        self
    }

    pub fn config(&self) -> &JubenConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<IdentityStore> {
        &self.identity
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

pub struct SessionController {
    ctx: Arc<ClientContext>,
}

impl SessionController {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn from_shared(ctx: Arc<ClientContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.ctx
    }

    pub fn current_user_id(&self) -> String {
        self.ctx.identity.get_or_create_user_id()
    }

    pub fn current_session_id(&self) -> String {
        self.ctx.identity.get_or_create_session_id()
    }

    /// Start a new local conversation context.
    pub fn create_new_session(&self) -> String {
        self.ctx.identity.rotate_session()
    }

    pub async fn send_message(
        &self,
        agent_id: &str,
        query: &str,
        options: ChatOptions,
    ) -> JubenResult<ChatStream> {
        self.send_message_with_policy(agent_id, query, options, ErrorPolicy::default())
            .await
    }

    /// Validate, POST to `{base}/{ns}/{agent}` with retries, and hand back
    /// the event stream once the response headers are in.
    ///
    /// Failures before the body starts flowing come back as `Err`; later
    /// ones show up on the stream.
    pub async fn send_message_with_policy(
        &self,
        agent_id: &str,
        query: &str,
        options: ChatOptions,
        policy: ErrorPolicy,
    ) -> JubenResult<ChatStream> {
        let limits = &self.ctx.config.limits;
        if let Err(err) = validate_chat_input(agent_id, query, &options, limits) {
            debug!(agent = %agent_id, error_code = err.error_code(), "Chat input rejected");
            return Err(err);
        }

        let agent_id = agent_id.trim();
        let user_id = self.ctx.identity.get_or_create_user_id();
        let session_id = self.ctx.identity.get_or_create_session_id();

        let body = ChatRequest::new(&user_id, &session_id, agent_id, query, options);
        let request = HttpRequest::post(self.url(&[agent_id])?)
            .header("Accept", "text/event-stream")
            .json(&body)?;

        debug!(agent = %agent_id, session_id = %session_id, "Sending chat request");

        let response = self
            .ctx
            .transport
            .send(request, self.ctx.config.api.max_retries)
            .await
            .map_err(|e| {
                let err = JubenError::from(e);
                err.log();
                err
            })?;

        let mut response = ensure_success(response).await?;
        let Some(body) = response.take_body() else {
            return Err(JubenError::EmptyResponseBody);
        };

        debug!(agent = %agent_id, status = response.status, "Streaming response");
        Ok(ChatStream::new(body, policy, agent_id, session_id))
    }

    pub async fn health_check(&self) -> JubenResult<HealthStatus> {
        self.get_json(&["health"]).await
    }

    pub async fn list_agents(&self) -> JubenResult<Vec<AgentInfo>> {
        self.get_json(&["agents"]).await
    }

    pub async fn system_status(&self) -> JubenResult<SystemStatus> {
        self.get_json(&["status"]).await
    }

    pub async fn list_sessions(&self) -> JubenResult<Vec<SessionInfo>> {
        let user_id = self.current_user_id();
        self.get_json(&["sessions", &user_id]).await
    }

    /// Ask the backend for a new session and make it the current one.
    pub async fn create_remote_session(&self) -> JubenResult<CreatedSession> {
        let user_id = self.current_user_id();
        let request = HttpRequest::post(self.url(&["sessions", &user_id])?);

        let response: CreateSessionResponse = self.one_shot(request).await?;
        self.ctx.identity.set_session_id(&response.data.session_id);

        info!(session_id = %response.data.session_id, "Remote session created");
        Ok(response.data)
    }

    /// Delete a server-side session. Deleting the current session also
    /// rotates to a fresh local id.
    pub async fn delete_session(&self, session_id: &str) -> JubenResult<()> {
        let user_id = self.current_user_id();
        let request = HttpRequest::delete(self.url(&["sessions", &user_id, session_id])?);

        let response = self.ctx.transport.execute_once(request).await?;
        ensure_success(response).await?;

        if self.current_session_id() == session_id {
            let replacement = self.ctx.identity.rotate_session();
            info!(
                deleted = %session_id,
                session_id = %replacement,
                "Current session deleted, rotated to a new one"
            );
        } else {
            info!(deleted = %session_id, "Session deleted");
        }

        Ok(())
    }

    pub async fn export_content(
        &self,
        session_id: &str,
        format: &str,
        content_types: &[String],
        include_metadata: bool,
    ) -> JubenResult<ExportResult> {
        let body = ExportRequest {
            user_id: self.current_user_id(),
            session_id: session_id.to_string(),
            export_format: format.to_string(),
            content_types: content_types.to_vec(),
            include_metadata,
        };
        let request = HttpRequest::post(self.url(&["export", "content"])?).json(&body)?;

        self.one_shot(request).await
    }

    /// `{api_root}/{segments...}` with every segment percent-encoded, so an
    /// id can never reach a different endpoint.
    fn url(&self, segments: &[&str]) -> JubenResult<String> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(JubenError::InvalidPathSegment(bad.to_string()));
        }

        let root = self.ctx.config.api.api_root();
        let mut url = Url::parse(&root).map_err(|e| JubenError::InvalidConfigValue {
            key: "api.base_url".to_string(),
            message: format!("'{}' is not a valid URL: {}", root, e),
        })?;

        url.path_segments_mut()
            .map_err(|_| JubenError::InvalidConfigValue {
                key: "api.base_url".to_string(),
                message: format!("'{}' cannot carry a path", root),
            })?
            .pop_if_empty()
            .extend(segments);

        Ok(url.into())
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> JubenResult<T> {
        self.one_shot(HttpRequest::get(self.url(segments)?)).await
    }

    async fn one_shot<T: DeserializeOwned>(&self, request: HttpRequest) -> JubenResult<T> {
        let response = self.ctx.transport.execute_once(request).await?;
        ensure_success(response).await?.json().await
    }
}

/// Pass 2xx responses through; turn anything else into a status error,
/// using the start of the body as detail when there is one.
async fn ensure_success(response: HttpResponse) -> JubenResult<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    let status_text = response.status_text();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();

    let message = if body.is_empty() {
        status_text
    } else {
        let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        format!("{}: {}", status_text, preview)
    };

    let err = JubenError::HttpStatus { status, message };
    err.log();
    Err(err)
}
