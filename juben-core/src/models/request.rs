use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::error::{JubenError, JubenResult};

/// A file sent along with a query. `kind` travels as `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileAttachment {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            kind: kind.into(),
            size: Some(content.len() as u64),
            content,
            name: name.into(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Declared size, or the content length when none was declared.
    pub fn effective_size(&self) -> u64 {
        self.size.unwrap_or(self.content.len() as u64)
    }
}

/// Optional knobs for a chat request. Unset fields are left off the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAttachment>,

    /// Project context such as `genre`, `target_audience` or `style`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub background: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_word_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_count: Option<u32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object, rejecting fields that are not known.
    pub fn from_json(value: serde_json::Value) -> JubenResult<Self> {
        serde_json::from_value(value).map_err(|e| JubenError::InvalidOptions(e.to_string()))
    }

    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_background(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.background.insert(key.into(), value.into());
        self
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    pub fn with_evaluation_type(mut self, evaluation_type: impl Into<String>) -> Self {
        self.evaluation_type = Some(evaluation_type.into());
        self
    }

    pub fn with_work_type(mut self, work_type: impl Into<String>) -> Self {
        self.work_type = Some(work_type.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_auto(mut self, auto: bool) -> Self {
        self.auto = Some(auto);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_max_word_count(mut self, max_word_count: u32) -> Self {
        self.max_word_count = Some(max_word_count);
        self
    }

    pub fn with_evaluation_count(mut self, evaluation_count: u32) -> Self {
        self.evaluation_count = Some(evaluation_count);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestData {
    pub query: String,
    pub agent_type: String,
    #[serde(flatten)]
    pub options: ChatOptions,
}

/// Body of the streaming chat POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub session_id: String,
    pub request_data: RequestData,
}

impl ChatRequest {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        query: impl Into<String>,
        options: ChatOptions,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            request_data: RequestData {
                query: query.into(),
                agent_type: agent_id.into(),
                options,
            },
        }
    }
}

/// Reject input that must never reach the network.
pub fn validate_chat_input(
    agent_id: &str,
    query: &str,
    options: &ChatOptions,
    limits: &LimitsConfig,
) -> JubenResult<()> {
    if agent_id.trim().is_empty() {
        return Err(JubenError::EmptyAgentId);
    }

    if query.trim().is_empty() {
        return Err(JubenError::EmptyQuery);
    }

    let length = query.chars().count();
    if length > limits.max_message_length {
        return Err(JubenError::QueryTooLong {
            length,
            max: limits.max_message_length,
        });
    }

    for file in &options.files {
        let size = file.effective_size();
        if size > limits.max_file_size {
            return Err(JubenError::FileTooLarge {
                name: file.name.clone(),
                size,
                max: limits.max_file_size,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_options_are_omitted() {
        let request = ChatRequest::new("u1", "s1", "juben_concierge", "hi", ChatOptions::new());
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "user_id": "u1",
                "session_id": "s1",
                "request_data": {"query": "hi", "agent_type": "juben_concierge"}
            })
        );
    }

    #[test]
    fn test_options_are_flattened() {
        let options = ChatOptions::new()
            .with_theme("urban romance")
            .with_auto(true)
            .with_background("genre", "comedy")
            .with_file(FileAttachment::new("text", "outline.txt", "act one"));
        let request = ChatRequest::new("u1", "s1", "short_drama_creator", "write", options);
        let data = &serde_json::to_value(&request).unwrap()["request_data"];

        assert_eq!(data["theme"], "urban romance");
        assert_eq!(data["auto"], true);
        assert_eq!(data["background"]["genre"], "comedy");
        assert_eq!(data["files"][0]["type"], "text");
        assert_eq!(data["files"][0]["size"], 7);
        assert!(data.get("workflow_type").is_none());
        assert!(data.get("chunk_size").is_none());
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = ChatOptions::from_json(json!({"theme": "x", "temperature": 0.3})).unwrap_err();
        assert!(matches!(err, JubenError::InvalidOptions(_)));

        let options = ChatOptions::from_json(json!({"theme": "x", "max_word_count": 800})).unwrap();
        assert_eq!(options.max_word_count, Some(800));
    }

    #[test]
    fn test_validation() {
        let limits = LimitsConfig {
            max_message_length: 5,
            max_file_size: 4,
        };
        let none = ChatOptions::new();

        assert!(matches!(
            validate_chat_input("  ", "hi", &none, &limits),
            Err(JubenError::EmptyAgentId)
        ));
        assert!(matches!(
            validate_chat_input("agent", " \n\t", &none, &limits),
            Err(JubenError::EmptyQuery)
        ));
        assert!(matches!(
            validate_chat_input("agent", "toolong", &none, &limits),
            Err(JubenError::QueryTooLong { length: 7, max: 5 })
        ));

        let big = ChatOptions::new().with_file(FileAttachment::new("text", "a.txt", "12345"));
        assert!(matches!(
            validate_chat_input("agent", "hi", &big, &limits),
            Err(JubenError::FileTooLarge { size: 5, .. })
        ));

        assert!(validate_chat_input("agent", "hello", &none, &limits).is_ok());
    }

    #[test]
    fn test_query_length_counts_characters() {
        let limits = LimitsConfig {
            max_message_length: 4,
            max_file_size: 1024,
        };
        assert!(validate_chat_input("agent", "剧本创作", &ChatOptions::new(), &limits).is_ok());
    }
}
