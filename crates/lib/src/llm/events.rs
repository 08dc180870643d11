//! Streaming event payloads of the Messages API (`data:` lines of the SSE body).

use serde::Deserialize;

/// One decoded server-sent event, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(default)]
        message: MessageMetadata,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockInfo,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaInfo,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorInfo,
    },
}

/// Header of the message being streamed (sent once, in `message_start`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
}

/// Declared kind of a block in `content_block_start`. `id` and `name` are set for `tool_use`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentBlockInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Incremental payload for one block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
}

impl Delta {
    /// Wire name of the delta kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Delta::TextDelta { .. } => "text_delta",
            Delta::ThinkingDelta { .. } => "thinking_delta",
            Delta::InputJsonDelta { .. } => "input_json_delta",
        }
    }

    pub fn fragment(&self) -> &str {
        match self {
            Delta::TextDelta { text } => text,
            Delta::ThinkingDelta { thinking } => thinking,
            Delta::InputJsonDelta { partial_json } => partial_json,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageDeltaInfo {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tool_use_block_start() {
        let ev: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"read_file","input":{}}}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlockInfo {
                    kind: "tool_use".to_string(),
                    id: Some("toolu_1".to_string()),
                    name: Some("read_file".to_string()),
                },
            }
        );
    }

    #[test]
    fn decodes_input_json_delta() {
        let ev: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"pa"}}"#,
        )
        .unwrap();
        match ev {
            StreamEvent::ContentBlockDelta { index, delta } => {
                assert_eq!(index, 0);
                assert_eq!(delta.kind(), "input_json_delta");
                assert_eq!(delta.fragment(), "{\"pa");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn message_start_tolerates_extra_fields() {
        let ev: StreamEvent = serde_json::from_str(
            r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","model":"m","content":[],"usage":{"input_tokens":3}}}"#,
        )
        .unwrap();
        assert!(matches!(ev, StreamEvent::MessageStart { message } if message.id == "msg_1"));
    }

    #[test]
    fn error_event_carries_message() {
        let ev: StreamEvent = serde_json::from_str(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap();
        assert!(matches!(ev, StreamEvent::Error { error } if error.message == "Overloaded"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"mystery"}"#).is_err());
    }
}
