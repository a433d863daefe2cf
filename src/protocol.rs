use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a fresh chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_ids: Option<Vec<String>>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            organization_id: None,
            team_id: None,
            media_ids: None,
            stream: true,
        }
    }

    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Attach uploaded media. An empty list is left off the wire.
    pub fn media(mut self, media_ids: Vec<String>) -> Self {
        self.media_ids = if media_ids.is_empty() {
            None
        } else {
            Some(media_ids)
        };
        self
    }
}

/// Body of a resume request, sent after the user answers a tool approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub conversation_id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub approved: bool,
    pub stream: bool,
}

impl ResumeRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        organization_id: impl Into<String>,
        approved: bool,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            organization_id: organization_id.into(),
            team_id: None,
            approved,
            stream: true,
        }
    }

    pub fn team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}

/// A retrieved document chunk the backend cites for the current reply.
///
/// Read leniently: a field whose value has an unexpected type (a string
/// `score`, a fractional `chunk_index`) stays in `extra`
/// under its own key, so nothing the backend sent is dropped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct MessageSource {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TryFrom<Value> for MessageSource {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut object = match value {
            Value::Object(object) => object,
            other => return Err(format!("source entry must be an object, got {other}")),
        };

        Ok(Self {
            content: take_as(&mut object, "content", as_text).unwrap_or_default(),
            source: take_as(&mut object, "source", as_text).unwrap_or_default(),
            file_type: take_as(&mut object, "file_type", as_text),
            metadata: take_as(&mut object, "metadata", |v| v.as_object().cloned()),
            score: take_as(&mut object, "score", as_score),
            chunk_index: take_as(&mut object, "chunk_index", as_index),
            document_id: take_as(&mut object, "document_id", as_id),
            extra: object,
        })
    }
}

/// Remove `key` when `convert` accepts its value. `null` counts as absent;
/// anything `convert` rejects is left in the map.
fn take_as<T>(
    object: &mut Map<String, Value>,
    key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = object.get(key)?;
    if value.is_null() {
        object.remove(key);
        return None;
    }
    let converted = convert(value)?;
    object.remove(key);
    Some(converted)
}

fn as_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn as_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(score) => score.as_f64(),
        Value::String(score) => score.trim().parse().ok(),
        _ => None,
    }
}

fn as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(index) => index.as_i64().or_else(|| {
            index
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(index) => index.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleUpdate {
    pub title: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolApproval {
    pub conversation_id: String,
    pub tool_name: String,
    pub tool_args: Map<String, Value>,
    pub tool_call_id: Option<String>,
    pub tool_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceList {
    pub conversation_id: String,
    pub sources: Vec<MessageSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailBlock {
    pub message: String,
    pub conversation_id: String,
}

/// One classified event from an agent chat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Token(String),
    Title(TitleUpdate),
    Done(Completion),
    Error(String),
    ToolApproval(ToolApproval),
    Sources(SourceList),
    GuardrailBlock(GuardrailBlock),
}

impl StreamEvent {
    /// `done` and `error` end the conversation turn; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Token(_) => "token",
            StreamEvent::Title(_) => "title",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error(_) => "error",
            StreamEvent::ToolApproval(_) => "tool_approval",
            StreamEvent::Sources(_) => "sources",
            StreamEvent::GuardrailBlock(_) => "guardrail_block",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_omits_unset_fields() {
        let request = ChatRequest::new("hi").organization("org_1").media(Vec::new());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({"message": "hi", "organization_id": "org_1", "stream": true})
        );
    }

    #[test]
    fn resume_request_always_streams() {
        let request = ResumeRequest::new("c1", "org_1", false).team("t1");
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "conversation_id": "c1",
                "organization_id": "org_1",
                "team_id": "t1",
                "approved": false,
                "stream": true
            })
        );
    }

    #[test]
    fn stream_event_uses_type_tag() {
        let event = StreamEvent::Title(TitleUpdate {
            title: "Trip planning".to_string(),
            conversation_id: "c1".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "title", "data": {"title": "Trip planning", "conversation_id": "c1"}})
        );
        assert_eq!(
            serde_json::to_value(StreamEvent::Token("Hel".to_string())).unwrap(),
            json!({"type": "token", "data": "Hel"})
        );
    }

    #[test]
    fn message_source_keeps_unknown_fields() {
        let source: MessageSource = serde_json::from_value(json!({
            "content": "chunk text",
            "source": "handbook.pdf",
            "file_type": "pdf",
            "metadata": null,
            "score": 0.82,
            "chunk_index": 3,
            "document_id": "doc_9",
            "page": 12
        }))
        .unwrap();
        assert_eq!(source.source, "handbook.pdf");
        assert_eq!(source.chunk_index, Some(3));
        assert!(source.metadata.is_none());
        assert_eq!(source.extra.get("page"), Some(&json!(12)));

        let round = serde_json::to_value(&source).unwrap();
        assert_eq!(round["page"], json!(12));
    }

    #[test]
    fn message_source_tolerates_odd_field_types() {
        let source: MessageSource = serde_json::from_value(json!({
            "content": "chunk text",
            "source": "handbook.pdf",
            "score": "0.5",
            "chunk_index": 1.0,
            "document_id": 42,
            "metadata": "not a map"
        }))
        .unwrap();
        assert_eq!(source.score, Some(0.5));
        assert_eq!(source.chunk_index, Some(1));
        assert_eq!(source.document_id.as_deref(), Some("42"));
        assert!(source.metadata.is_none());
        assert_eq!(source.extra.get("metadata"), Some(&json!("not a map")));

        let fractional: MessageSource =
            serde_json::from_value(json!({"source": "a", "chunk_index": 2.5, "score": "high"}))
                .unwrap();
        assert_eq!(fractional.chunk_index, None);
        assert_eq!(fractional.score, None);
        let round = serde_json::to_value(&fractional).unwrap();
        assert_eq!(round, json!({"source": "a", "chunk_index": 2.5, "score": "high"}));
    }

    #[test]
    fn message_source_must_be_an_object() {
        assert!(serde_json::from_value::<MessageSource>(json!("doc.pdf")).is_err());
    }

    #[test]
    fn terminal_variants() {
        assert!(StreamEvent::Error("x".to_string()).is_terminal());
        assert!(
            StreamEvent::Done(Completion {
                conversation_id: "c1".to_string()
            })
            .is_terminal()
        );
        assert!(!StreamEvent::Token("x".to_string()).is_terminal());
    }
}
