use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_SOURCE: &str = "unknown";
pub const PARSER_SOURCE: &str = "stream_parser";
pub const READER_SOURCE: &str = "stream_reader";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(alias = "text", alias = "llm_chunk")]
    Content,
    Done,
    Complete,
    Error,
}

impl EventKind {
    /// Wire name to kind. Returns `None` for anything outside the closed set.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "content" | "text" | "llm_chunk" => Some(EventKind::Content),
            "done" => Some(EventKind::Done),
            "complete" => Some(EventKind::Complete),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Content => "content",
            EventKind::Done => "done",
            EventKind::Complete => "complete",
            EventKind::Error => "error",
        }
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, EventKind::Done | EventKind::Complete)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub content_type: String,
    #[serde(default)]
    pub data: Value,
}

/// One typed event from the agent stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "agent_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

impl StreamEvent {
    pub fn new(kind: EventKind, content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            source: source.into(),
            payload: None,
        }
    }

    pub fn content(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(EventKind::Content, text, source)
    }

    pub fn error(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message, source)
    }

    pub fn with_payload(mut self, content_type: impl Into<String>, data: Value) -> Self {
        self.payload = Some(EventPayload {
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_content(&self) -> bool {
        self.kind == EventKind::Content
    }

    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }

    pub fn is_terminal_success(&self) -> bool {
        self.kind.is_terminal_success()
    }

    /// An error the agent flagged as ending the exchange (`"fatal": true`),
    /// or one produced because the body could not be read any further.
    pub fn is_fatal_error(&self) -> bool {
        if !self.is_error() {
            return false;
        }
        if self.source == READER_SOURCE {
            return true;
        }
        self.payload
            .as_ref()
            .and_then(|p| p.data.get("fatal"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// True for events made up on the client rather than sent by the agent.
    pub fn is_synthetic(&self) -> bool {
        self.source == PARSER_SOURCE || self.source == READER_SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_wire() {
        assert_eq!(EventKind::from_wire("content"), Some(EventKind::Content));
        assert_eq!(EventKind::from_wire("llm_chunk"), Some(EventKind::Content));
        assert_eq!(EventKind::from_wire("text"), Some(EventKind::Content));
        assert_eq!(EventKind::from_wire("complete"), Some(EventKind::Complete));
        assert_eq!(EventKind::from_wire("thinking"), None);
        assert!(EventKind::Done.is_terminal_success());
        assert!(!EventKind::Error.is_terminal_success());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let event = StreamEvent::content("hi", "planner");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "content");
        assert_eq!(value["agent_source"], "planner");
        assert!(value.get("payload").is_none());

        let parsed: StreamEvent = serde_json::from_value(json!({
            "type": "llm_chunk",
            "content": "x",
            "timestamp": "2024-05-01T10:00:00Z",
            "agent_source": "writer"
        }))
        .unwrap();
        assert_eq!(parsed.kind, EventKind::Content);
    }

    #[test]
    fn test_fatal_error_detection() {
        let plain = StreamEvent::error("tool failed", "writer");
        assert!(!plain.is_fatal_error());

        let fatal = StreamEvent::error("quota", "writer").with_payload("error", json!({"fatal": true}));
        assert!(fatal.is_fatal_error());

        let reader = StreamEvent::error("connection reset", READER_SOURCE);
        assert!(reader.is_fatal_error());
        assert!(reader.is_synthetic());

        let content = StreamEvent::content("x", "writer").with_payload("meta", json!({"fatal": true}));
        assert!(!content.is_fatal_error());
    }
}
