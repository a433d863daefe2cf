//! Maps decoded frames onto [`StreamEvent`]s.
//!
//! Payloads are read into a [`FramePayload`] first, so each rule below only
//! touches fields it has checked. Rules are evaluated top to bottom and the
//! first match wins:
//!
//! 1. `event: title` with a `title` field -> `title`
//! 2. `event: error`, or any payload with an `error` field -> `error`
//! 3. `event: done` -> `done`
//! 4. `event: tool_approval` -> `tool_approval`
//! 5. `event: sources` with a `sources` list -> `sources`
//! 6. `event: guardrail_block` (chat streams only) -> `guardrail_block`
//! 7. a `token` field -> `token`
//! 8. a `conversation_id` without `token` or `title` -> `done`
//!
//! Resume streams skip rules 1 and 6.

use crate::protocol::{
    Completion, GuardrailBlock, MessageSource, SourceList, StreamEvent, TitleUpdate, ToolApproval,
};
use crate::sse::RawFrame;
use serde_json::{Map, Value};
use tracing::debug;

const UNKNOWN_ERROR: &str = "Unknown error";

/// Which endpoint a stream came from. The two share framing but differ in
/// the events they can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// A fresh chat turn.
    Chat,
    /// A turn resumed after a tool approval decision.
    Resume,
}

impl StreamKind {
    fn emits_titles(self) -> bool {
        matches!(self, StreamKind::Chat)
    }

    fn emits_guardrail_blocks(self) -> bool {
        matches!(self, StreamKind::Chat)
    }
}

/// The fields any classification rule may look at. A field that is absent
/// or JSON `null` is `None`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FramePayload {
    pub token: Option<String>,
    pub title: Option<String>,
    pub conversation_id: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub tool_name: Option<String>,
    pub tool_args: Option<Map<String, Value>>,
    pub tool_call_id: Option<String>,
    pub tool_description: Option<String>,
    pub sources: Option<Vec<MessageSource>>,
}

impl FramePayload {
    /// Read the known fields out of a parsed payload. Anything that is not
    /// a JSON object yields an empty payload.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::default();
        };

        let sources = object.remove("sources").and_then(source_list);

        let tool_args = match object.remove("tool_args") {
            Some(Value::Object(args)) => Some(args),
            _ => None,
        };

        Self {
            token: text_field(&mut object, "token"),
            title: text_field(&mut object, "title"),
            conversation_id: text_field(&mut object, "conversation_id"),
            error: text_field(&mut object, "error"),
            message: text_field(&mut object, "message"),
            tool_name: text_field(&mut object, "tool_name"),
            tool_args,
            tool_call_id: text_field(&mut object, "tool_call_id"),
            tool_description: text_field(&mut object, "tool_description"),
            sources,
        }
    }

    fn conversation_id(&self) -> String {
        self.conversation_id.clone().unwrap_or_default()
    }
}

/// A present `sources` key always yields a list, so an `event: sources`
/// frame is never mistaken for a bare completion. Entries that are not
/// objects are dropped; a value that is not an array yields an empty list.
fn source_list(raw: Value) -> Option<Vec<MessageSource>> {
    let items = match raw {
        Value::Null => return None,
        Value::Array(items) => items,
        other => {
            debug!(value = %other, "sources is not a list");
            return Some(Vec::new());
        }
    };

    let sources = items
        .into_iter()
        .filter_map(|item| match MessageSource::try_from(item) {
            Ok(source) => Some(source),
            Err(err) => {
                debug!(error = %err, "skipping source entry");
                None
            }
        })
        .collect();
    Some(sources)
}

/// Strings pass through; other non-null values keep their JSON text so a
/// structured `error` object still reaches the user.
fn text_field(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Classify one decoded frame. Returns `None` for non-JSON data and for
/// payloads that match no rule.
pub fn classify_frame(kind: StreamKind, frame: &RawFrame) -> Option<StreamEvent> {
    let value: Value = match serde_json::from_str(&frame.data) {
        Ok(value) => value,
        Err(err) => {
            debug!(event = frame.event_name(), error = %err, "skipping non-JSON data frame");
            return None;
        }
    };
    classify(kind, frame.event_name(), FramePayload::from_value(value))
}

/// Apply the classification rules to an already-parsed payload.
pub fn classify(kind: StreamKind, event: &str, payload: FramePayload) -> Option<StreamEvent> {
    if kind.emits_titles() && event == "title" {
        if let Some(title) = payload.title.clone() {
            return Some(StreamEvent::Title(TitleUpdate {
                title,
                conversation_id: payload.conversation_id(),
            }));
        }
    }

    if event == "error" || payload.error.is_some() {
        let message = payload
            .error
            .or(payload.message)
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        return Some(StreamEvent::Error(message));
    }

    match event {
        "done" => {
            return Some(StreamEvent::Done(Completion {
                conversation_id: payload.conversation_id(),
            }));
        }
        "tool_approval" => {
            return Some(StreamEvent::ToolApproval(ToolApproval {
                conversation_id: payload.conversation_id(),
                tool_name: payload.tool_name.unwrap_or_default(),
                tool_args: payload.tool_args.unwrap_or_default(),
                tool_call_id: payload.tool_call_id,
                tool_description: payload.tool_description.unwrap_or_default(),
            }));
        }
        "sources" if payload.sources.is_some() => {
            return Some(StreamEvent::Sources(SourceList {
                conversation_id: payload.conversation_id(),
                sources: payload.sources.unwrap_or_default(),
            }));
        }
        "guardrail_block" if kind.emits_guardrail_blocks() => {
            let conversation_id = payload.conversation_id();
            return Some(StreamEvent::GuardrailBlock(GuardrailBlock {
                message: payload.message.unwrap_or_default(),
                conversation_id,
            }));
        }
        _ => {}
    }

    if let Some(token) = payload.token {
        return Some(StreamEvent::Token(token));
    }

    // Backends that forget `event: done` still end with a bare conversation id.
    if let Some(conversation_id) = payload.conversation_id {
        if payload.title.is_none() {
            debug!(event, %conversation_id, "inferring done from bare conversation_id");
            return Some(StreamEvent::Done(Completion { conversation_id }));
        }
    }

    None
}
