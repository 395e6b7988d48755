//! Error types for the Juben core library.
//!
//! Every failure the client can hit maps onto [`JubenError`]. Each variant
//! carries a stable code in its message so logs and bug reports can be
//! matched without parsing free text, and each can be classified into the
//! coarse user-facing [`ErrorKind`] that [`user_message`] translates.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Validation | Caller input rejected before any network call |
//! | E2001-E2099 | Config | Config file, environment and validation errors |
//! | E3001-E3099 | Network | Connection, DNS, reset and timeout failures |
//! | E4001-E4099 | Protocol | Non-success HTTP status and unusable responses |
//! | E5001-E5099 | Stream | Failures after the event stream started |
//! | E6001-E6099 | Storage | Persistence provider failures |
//! | E9001-E9099 | General | Internal, IO and serialization errors |

use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::transport::{NetworkError, NetworkErrorKind};

/// The main error type for the Juben core library.
#[derive(Debug, Error)]
pub enum JubenError {
    // ========================================================================
    // Validation Errors (E1001-E1099)
    // ========================================================================
    /// No agent identifier was given
    #[error("[E1001] Agent id must not be empty")]
    EmptyAgentId,

    /// Query is empty after trimming
    #[error("[E1002] Query must not be empty")]
    EmptyQuery,

    /// Query exceeds the configured message length
    #[error("[E1003] Query is {length} characters long, the limit is {max}")]
    QueryTooLong { length: usize, max: usize },

    /// An attached file exceeds the configured size limit
    #[error("[E1004] File '{name}' is {size} bytes, the limit is {max}")]
    FileTooLarge { name: String, size: u64, max: u64 },

    /// Request options could not be interpreted
    #[error("[E1005] Invalid request options: {0}")]
    InvalidOptions(String),

    /// An id cannot be used as a URL path segment
    #[error("[E1006] '{0}' is not a usable id")]
    InvalidPathSegment(String),

    // ========================================================================
    // Configuration Errors (E2001-E2099)
    // ========================================================================
    /// Configuration source could not be parsed
    #[error("[E2001] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E2002] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // Network Errors (E3001-E3099)
    // ========================================================================
    /// Connection could not be established or was dropped
    #[error("[E3001] Network error: {0}")]
    Network(NetworkError),

    /// No response headers arrived within the request timeout
    #[error("[E3002] Request timed out: {0}")]
    RequestTimeout(String),

    /// The request was aborted on the client side
    #[error("[E3003] Request aborted: {0}")]
    RequestAborted(String),

    // ========================================================================
    // Protocol Errors (E4001-E4099)
    // ========================================================================
    /// Backend answered with a non-success status
    #[error("[E4001] API request failed with status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Successful status but no body to stream from
    #[error("[E4002] Response body is empty")]
    EmptyResponseBody,

    /// One-shot response body could not be decoded
    #[error("[E4003] Failed to parse API response: {0}")]
    ApiParseError(String),

    // ========================================================================
    // Stream Errors (E5001-E5099)
    // ========================================================================
    /// The byte stream failed after events had started flowing
    #[error("[E5001] Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The agent emitted an error event that ends the exchange
    #[error("[E5002] Agent reported a fatal error: {0}")]
    TerminalEvent(String),

    // ========================================================================
    // Storage Errors (E6001-E6099)
    // ========================================================================
    /// Persistence provider failed
    #[error("[E6001] Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error
    #[error("[E9002] Serialization error: {0}")]
    SerializationError(String),

    /// IO error
    #[error("[E9003] IO error: {0}")]
    IoError(String),
}

/// Result type alias for Juben operations.
pub type JubenResult<T> = Result<T, JubenError>;

/// User-facing classification of an error.
///
/// These are the codes [`user_message`] knows how to translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Api,
    Validation,
    Timeout,
    Auth,
    RateLimit,
    Server,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Api => "API_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT_ERROR",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            s if s >= 500 => ErrorKind::Server,
            429 => ErrorKind::RateLimit,
            401 | 403 => ErrorKind::Auth,
            400 | 422 => ErrorKind::Validation,
            s if s >= 400 => ErrorKind::Api,
            _ => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Api,
    Validation,
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred, please retry later.";

/// Translate a classification code into a fixed, human-readable message.
///
/// This is the only place end-user text for failures is produced. Codes
/// that are not recognised fall back to a generic retry hint.
pub fn user_message(code: &str) -> &'static str {
    match code {
        "NETWORK_ERROR" => "Network connection problem, check your network settings and retry.",
        "API_ERROR" => "The service is temporarily unavailable, please retry later.",
        "VALIDATION_ERROR" => "The input is invalid, please check it and retry.",
        "TIMEOUT_ERROR" => "The request timed out, please retry later.",
        "AUTH_ERROR" => "Authentication failed, please sign in again.",
        "RATE_LIMIT_ERROR" => "Too many requests, please slow down and retry later.",
        "SERVER_ERROR" => "The server hit an internal error, please contact support.",
        _ => UNKNOWN_ERROR_MESSAGE,
    }
}

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<NetworkError> for JubenError {
    fn from(err: NetworkError) -> Self {
        match err.kind {
            NetworkErrorKind::Timeout => JubenError::RequestTimeout(err.message),
            NetworkErrorKind::Aborted => JubenError::RequestAborted(err.message),
            _ => JubenError::Network(err),
        }
    }
}

impl From<serde_json::Error> for JubenError {
    fn from(err: serde_json::Error) -> Self {
        JubenError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for JubenError {
    fn from(err: std::io::Error) -> Self {
        JubenError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for JubenError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => JubenError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::FileParse { uri, cause } => JubenError::ConfigParseError(
                format!("Failed to parse {}: {}", uri.unwrap_or_default(), cause),
            ),
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => JubenError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => JubenError::ConfigParseError(err.to_string()),
        }
    }
}

impl From<crate::identity::StorageError> for JubenError {
    fn from(err: crate::identity::StorageError) -> Self {
        JubenError::Storage(err.to_string())
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl JubenError {
    /// Returns true if the caller's input was rejected before any request.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            JubenError::EmptyAgentId
                | JubenError::EmptyQuery
                | JubenError::QueryTooLong { .. }
                | JubenError::FileTooLarge { .. }
                | JubenError::InvalidOptions(_)
                | JubenError::InvalidPathSegment(_)
        )
    }

    /// Returns true if this error is related to configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            JubenError::ConfigParseError(_) | JubenError::InvalidConfigValue { .. }
        )
    }

    /// Returns true if the failure happened before the event stream started.
    ///
    /// Stream errors are the only ones that can follow delivered events.
    pub fn is_pre_stream(&self) -> bool {
        !matches!(
            self,
            JubenError::StreamInterrupted(_) | JubenError::TerminalEvent(_)
        )
    }

    /// Returns true if this error is transient and the operation might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            JubenError::Network(err) => err.is_transient(),
            JubenError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            JubenError::StreamInterrupted(_) => true,
            _ => false,
        }
    }

    /// User-facing classification used by [`user_message`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            JubenError::Network(_) | JubenError::StreamInterrupted(_) => ErrorKind::Network,
            JubenError::RequestTimeout(_) => ErrorKind::Timeout,
            JubenError::HttpStatus { status, .. } => ErrorKind::from_status(*status),
            JubenError::EmptyResponseBody
            | JubenError::ApiParseError(_)
            | JubenError::TerminalEvent(_) => ErrorKind::Api,
            JubenError::EmptyAgentId
            | JubenError::EmptyQuery
            | JubenError::QueryTooLong { .. }
            | JubenError::FileTooLarge { .. }
            | JubenError::InvalidOptions(_)
            | JubenError::InvalidPathSegment(_) => ErrorKind::Validation,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::Network | ErrorKind::Timeout => ErrorCategory::Network,
            ErrorKind::Api | ErrorKind::Server | ErrorKind::RateLimit | ErrorKind::Auth => {
                ErrorCategory::Api
            }
            ErrorKind::Validation => ErrorCategory::Validation,
            ErrorKind::Unknown => {
                if matches!(self, JubenError::RequestAborted(_)) {
                    ErrorCategory::User
                } else {
                    ErrorCategory::System
                }
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            JubenError::HttpStatus { status, .. } if *status >= 500 => ErrorSeverity::Critical,
            JubenError::HttpStatus { .. } => ErrorSeverity::High,
            JubenError::Network(_) | JubenError::StreamInterrupted(_) => ErrorSeverity::High,
            JubenError::Internal(_) => ErrorSeverity::Critical,
            JubenError::RequestAborted(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            JubenError::EmptyAgentId => "E1001",
            JubenError::EmptyQuery => "E1002",
            JubenError::QueryTooLong { .. } => "E1003",
            JubenError::FileTooLarge { .. } => "E1004",
            JubenError::InvalidOptions(_) => "E1005",
            JubenError::InvalidPathSegment(_) => "E1006",
            JubenError::ConfigParseError(_) => "E2001",
            JubenError::InvalidConfigValue { .. } => "E2002",
            JubenError::Network(_) => "E3001",
            JubenError::RequestTimeout(_) => "E3002",
            JubenError::RequestAborted(_) => "E3003",
            JubenError::HttpStatus { .. } => "E4001",
            JubenError::EmptyResponseBody => "E4002",
            JubenError::ApiParseError(_) => "E4003",
            JubenError::StreamInterrupted(_) => "E5001",
            JubenError::TerminalEvent(_) => "E5002",
            JubenError::Storage(_) => "E6001",
            JubenError::Internal(_) => "E9001",
            JubenError::SerializationError(_) => "E9002",
            JubenError::IoError(_) => "E9003",
        }
    }

    /// The fixed end-user message for this error.
    pub fn user_message(&self) -> &'static str {
        user_message(self.kind().as_str())
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let kind = self.kind();

        if self.is_transient() {
            warn!(
                error_code = %code,
                kind = %kind,
                "Transient error occurred: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                kind = %kind,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for terminal display: friendly text first, details after.
pub struct CliErrorDisplay<'a> {
    error: &'a JubenError,
    show_details: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a JubenError) -> Self {
        Self {
            error,
            show_details: true,
        }
    }

    pub fn without_details(mut self) -> Self {
        self.show_details = false;
        self
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error.user_message())?;

        if self.show_details {
            writeln!(f)?;
            writeln!(f, "  Details: {}", self.error)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JubenError::HttpStatus {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert!(err.to_string().contains("E4001"));
        assert!(err.to_string().contains("404"));

        let err = JubenError::QueryTooLong {
            length: 12,
            max: 10,
        };
        assert!(err.to_string().contains("E1003"));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorKind::from_status(500), ErrorKind::Server);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Server);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::Api);
    }

    #[test]
    fn test_user_message_known_codes() {
        for kind in [
            ErrorKind::Network,
            ErrorKind::Api,
            ErrorKind::Validation,
            ErrorKind::Timeout,
            ErrorKind::Auth,
            ErrorKind::RateLimit,
            ErrorKind::Server,
        ] {
            assert_ne!(user_message(kind.as_str()), UNKNOWN_ERROR_MESSAGE);
        }
    }

    #[test]
    fn test_user_message_unknown_code_falls_back() {
        assert_eq!(user_message("UNKNOWN_ERROR"), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(user_message("E_SOMETHING_NEW"), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(user_message(""), UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_is_transient() {
        assert!(JubenError::HttpStatus {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(JubenError::HttpStatus {
            status: 429,
            message: String::new()
        }
        .is_transient());
        assert!(!JubenError::HttpStatus {
            status: 404,
            message: String::new()
        }
        .is_transient());
        assert!(JubenError::Network(NetworkError::new(NetworkErrorKind::Reset, "reset")).is_transient());
        assert!(!JubenError::EmptyQuery.is_transient());
    }

    #[test]
    fn test_from_network_error() {
        let err: JubenError = NetworkError::new(NetworkErrorKind::Timeout, "30000 ms").into();
        assert!(matches!(err, JubenError::RequestTimeout(_)));
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err: JubenError = NetworkError::new(NetworkErrorKind::Connect, "refused").into();
        assert!(matches!(err, JubenError::Network(_)));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_validation_errors() {
        assert!(JubenError::EmptyAgentId.is_validation_error());
        assert!(JubenError::EmptyQuery.is_validation_error());
        assert_eq!(JubenError::EmptyQuery.kind(), ErrorKind::Validation);
        assert_eq!(JubenError::EmptyQuery.category(), ErrorCategory::Validation);
        assert!(JubenError::EmptyQuery.is_pre_stream());
        assert!(!JubenError::StreamInterrupted("eof".to_string()).is_pre_stream());
    }

    #[test]
    fn test_severity() {
        let server = JubenError::HttpStatus {
            status: 500,
            message: String::new(),
        };
        let client = JubenError::HttpStatus {
            status: 404,
            message: String::new(),
        };
        assert_eq!(server.severity(), ErrorSeverity::Critical);
        assert_eq!(client.severity(), ErrorSeverity::High);
        assert!(JubenError::EmptyQuery.severity() < ErrorSeverity::High);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(JubenError::EmptyAgentId.error_code(), "E1001");
        assert_eq!(
            JubenError::ConfigParseError("x".to_string()).error_code(),
            "E2001"
        );
        assert_eq!(
            JubenError::RequestTimeout("x".to_string()).error_code(),
            "E3002"
        );
        assert_eq!(JubenError::EmptyResponseBody.error_code(), "E4002");
        assert_eq!(
            JubenError::TerminalEvent("x".to_string()).error_code(),
            "E5002"
        );
        assert_eq!(JubenError::Storage("x".to_string()).error_code(), "E6001");
        assert_eq!(JubenError::Internal("x".to_string()).error_code(), "E9001");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_result: Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let json_err = json_result.unwrap_err();
        let juben_err: JubenError = json_err.into();
        assert!(matches!(juben_err, JubenError::SerializationError(_)));
    }

    #[test]
    fn test_cli_error_display() {
        let err = JubenError::HttpStatus {
            status: 502,
            message: "Bad Gateway".to_string(),
        };
        let output = CliErrorDisplay::new(&err).to_string();
        assert!(output.starts_with(user_message("SERVER_ERROR")));
        assert!(output.contains("Details"));

        let output = CliErrorDisplay::new(&err).without_details().to_string();
        assert!(!output.contains("Bad Gateway"));
    }
}
