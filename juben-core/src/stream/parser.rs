use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::models::{EventKind, EventPayload, StreamEvent, PARSER_SOURCE, UNKNOWN_SOURCE};

pub const MALFORMED_FRAME: &str = "malformed_frame";

/// Parse one frame payload into an event.
///
/// Blank payloads are keep-alives and yield `None`. Anything else yields
/// exactly one event: the parsed one, or an `error` event from
/// `stream_parser` that carries the raw frame and what was wrong with it.
pub fn parse_frame(frame: &str) -> Option<StreamEvent> {
    if frame.trim().is_empty() {
        return None;
    }

    Some(match try_parse(frame) {
        Ok(event) => event,
        Err(reason) => malformed(frame, &reason),
    })
}

fn try_parse(frame: &str) -> Result<StreamEvent, String> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| format!("invalid JSON: {}", e))?;

    let Value::Object(object) = value else {
        return Err("payload is not a JSON object".to_string());
    };

    let kind = match object.get("type") {
        Some(Value::String(kind)) => {
            EventKind::from_wire(kind).ok_or_else(|| format!("unknown event type '{}'", kind))?
        }
        Some(_) => return Err("field 'type' is not a string".to_string()),
        None => return Err("missing field 'type'".to_string()),
    };

    let content = match object.get("content") {
        Some(Value::String(content)) => content.clone(),
        Some(Value::Null) | None => return Err("missing field 'content'".to_string()),
        Some(other) => other.to_string(),
    };

    let source = object
        .get("agent_source")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SOURCE);

    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let mut event = StreamEvent::new(kind, content, source).with_timestamp(timestamp);
    event.payload = parse_payload(&object);
    Ok(event)
}

fn parse_payload(object: &Map<String, Value>) -> Option<EventPayload> {
    let raw = object.get("payload")?;
    if raw.is_null() {
        return None;
    }

    match serde_json::from_value::<EventPayload>(raw.clone()) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "Event payload has an unexpected shape, keeping it as raw data");
            Some(EventPayload {
                content_type: "unknown".to_string(),
                data: raw.clone(),
            })
        }
    }
}

/// RFC 3339, or a naive ISO-8601 time taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn malformed(frame: &str, reason: &str) -> StreamEvent {
    warn!(reason, frame_len = frame.len(), "Malformed stream frame");
    StreamEvent::error(format!("Malformed stream frame: {}", reason), PARSER_SOURCE).with_payload(
        MALFORMED_FRAME,
        json!({
            "raw": frame,
            "reason": reason,
        }),
    )
}
