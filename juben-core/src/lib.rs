#![allow(
    clippy::needless_borrows_for_generic_args,
    clippy::derivable_impls,
    clippy::type_complexity,
    clippy::len_zero
)]

//! Client core for the Juben script-writing agents.
//!
//! A [`SessionController`] sends a message to an agent and hands back a
//! [`ChatStream`] of typed [`StreamEvent`]s decoded from the backend's
//! server-sent-events body. Requests go through a [`Transport`] that
//! retries transient failures with exponential backoff and times every
//! attempt into a [`PerformanceMonitor`].

pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod session;
pub mod stream;
pub mod transport;

pub use config::{
    ensure_data_dir, get_config_dir, get_data_dir, ApiConfig, JubenConfig, LimitsConfig,
    LoggingConfig, MetricsConfig, StorageConfig,
};
pub use error::{
    user_message, CliErrorDisplay, ErrorCategory, ErrorKind, ErrorSeverity, JubenError,
    JubenResult,
};
pub use identity::{
    generate_id, FileStore, IdentityStore, KeyValueStore, MemoryStore, StorageError,
    SESSION_ID_KEY, USER_ID_KEY,
};
pub use metrics::{NoopSink, PerformanceMonitor, PerformanceSample, PerformanceSink, PerformanceStats};
pub use models::{
    AgentInfo, ChatOptions, ChatRequest, CreatedSession, EventKind, EventPayload, ExportResult,
    FileAttachment, HealthStatus, SessionInfo, StreamEvent, SystemStatus,
};
pub use session::{ChatStream, ClientContext, Completion, ErrorPolicy, SessionController, SessionState};
pub use stream::{parse_frame, FrameDecoder, DONE_MARKER};
pub use transport::{
    ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, NetworkError, NetworkErrorKind,
    ReqwestClient, RetryConfig, Sleeper, TokioSleeper, Transport,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
