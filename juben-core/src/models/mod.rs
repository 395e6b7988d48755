mod api;
mod event;
mod request;

pub(crate) use api::CreateSessionResponse;
pub use api::{
    AgentInfo, CreatedSession, ExportRequest, ExportResult, HealthStatus, SessionInfo,
    SystemStatus,
};
pub use event::{
    EventKind, EventPayload, StreamEvent, PARSER_SOURCE, READER_SOURCE, UNKNOWN_SOURCE,
};
pub use request::{validate_chat_input, ChatOptions, ChatRequest, FileAttachment, RequestData};
