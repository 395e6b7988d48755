use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.status.to_lowercase().as_str(),
            "ok" | "healthy" | "success"
        )
    }
}

/// An entry of the backend's agent catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub system_status: String,
    #[serde(default)]
    pub active_agents: u64,
    #[serde(default)]
    pub available_tools: u64,
    #[serde(default)]
    pub active_sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
}

/// `POST /{ns}/sessions/{user}` wraps the new session in `data`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateSessionResponse {
    pub data: CreatedSession,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest {
    pub user_id: String,
    pub session_id: String,
    pub export_format: String,
    pub content_types: Vec<String>,
    pub include_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub export_format: String,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub exported_data: String,
    #[serde(default)]
    pub filename: String,
}
