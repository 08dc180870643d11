//! Reduces the streaming event sequence of one model turn into content blocks.
//!
//! Blocks are addressed by the index assigned in `content_block_start`. Starts must arrive in
//! order (0, 1, 2, ...) and every delta must target a started block of the matching kind.
//! Anything else means the stream is out of sync with what we've built, so it's reported as
//! an [`AssembleError`] and the turn is aborted.

use crate::conversation::ContentBlock;
use crate::llm::{Delta, StreamEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("unknown content block type {0:?}")]
    UnknownBlockType(String),
    #[error("content block {got} started out of order (expected index {expected})")]
    OutOfOrderStart { expected: usize, got: usize },
    #[error("delta for content block {0} which was never started")]
    UnknownIndex(usize),
    #[error("{delta} cannot be applied to {block} block {index}")]
    KindMismatch {
        index: usize,
        block: &'static str,
        delta: &'static str,
    },
    /// The provider sent an `error` event.
    #[error("provider error: {0}")]
    Provider(String),
}

/// What an event did to the assembled blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Informational event; blocks untouched.
    Unchanged,
    /// A block was started or grew.
    Updated,
    /// `message_stop`: the message is complete.
    Finished,
}

/// A tool invocation requested by a finished message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON accumulated from `input_json_delta` fragments.
    pub input: String,
}

/// Tool calls among `blocks`, in order of appearance.
pub fn tool_calls(blocks: &[ContentBlock]) -> Vec<ToolCall> {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Growing block list for one streamed message. Owned by a single send operation.
#[derive(Debug, Default)]
pub struct BlockAssembler {
    blocks: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &StreamEvent) -> Result<Applied, AssembleError> {
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let expected = self.blocks.len();
                if *index != expected {
                    return Err(AssembleError::OutOfOrderStart {
                        expected,
                        got: *index,
                    });
                }
                let block = match content_block.kind.as_str() {
                    "text" => ContentBlock::Text {
                        text: String::new(),
                    },
                    "thinking" => ContentBlock::Thinking {
                        thinking: String::new(),
                    },
                    "tool_use" => ContentBlock::ToolUse {
                        id: content_block.id.clone().unwrap_or_default(),
                        name: content_block.name.clone().unwrap_or_default(),
                        input: String::new(),
                    },
                    other => return Err(AssembleError::UnknownBlockType(other.to_string())),
                };
                self.blocks.push(block);
                Ok(Applied::Updated)
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let block = self
                    .blocks
                    .get_mut(*index)
                    .ok_or(AssembleError::UnknownIndex(*index))?;
                let target = match (block, delta) {
                    (ContentBlock::Text { text }, Delta::TextDelta { .. }) => text,
                    (ContentBlock::Thinking { thinking }, Delta::ThinkingDelta { .. }) => thinking,
                    (ContentBlock::ToolUse { input, .. }, Delta::InputJsonDelta { .. }) => input,
                    (block, delta) => {
                        return Err(AssembleError::KindMismatch {
                            index: *index,
                            block: block.kind(),
                            delta: delta.kind(),
                        })
                    }
                };
                target.push_str(delta.fragment());
                Ok(Applied::Updated)
            }
            StreamEvent::MessageDelta { delta } => {
                if let Some(reason) = &delta.stop_reason {
                    log::debug!("assembler: stop reason {}", reason);
                    self.stop_reason = Some(reason.clone());
                }
                Ok(Applied::Unchanged)
            }
            StreamEvent::MessageStop => Ok(Applied::Finished),
            StreamEvent::Error { error } => Err(AssembleError::Provider(error.message.clone())),
            StreamEvent::MessageStart { .. }
            | StreamEvent::ContentBlockStop { .. }
            | StreamEvent::Ping => Ok(Applied::Unchanged),
        }
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn into_blocks(self) -> Vec<ContentBlock> {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlockInfo, ErrorInfo, MessageDeltaInfo};
    use pretty_assertions::assert_eq;

    fn start(index: usize, kind: &str) -> StreamEvent {
        StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlockInfo {
                kind: kind.to_string(),
                id: (kind == "tool_use").then(|| format!("toolu_{}", index)),
                name: (kind == "tool_use").then(|| "list_files".to_string()),
            },
        }
    }

    fn text(index: usize, s: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: Delta::TextDelta {
                text: s.to_string(),
            },
        }
    }

    fn json(index: usize, s: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: Delta::InputJsonDelta {
                partial_json: s.to_string(),
            },
        }
    }

    fn thinking(index: usize, s: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: Delta::ThinkingDelta {
                thinking: s.to_string(),
            },
        }
    }

    fn mixed_turn() -> Vec<StreamEvent> {
        vec![
            StreamEvent::MessageStart {
                message: Default::default(),
            },
            start(0, "thinking"),
            thinking(0, "need to "),
            thinking(0, "look"),
            StreamEvent::ContentBlockStop { index: 0 },
            start(1, "text"),
            text(1, "Let me "),
            StreamEvent::Ping,
            text(1, "check."),
            StreamEvent::ContentBlockStop { index: 1 },
            start(2, "tool_use"),
            json(2, "{\"pa"),
            json(2, "th\":"),
            json(2, "\".\"}"),
            StreamEvent::ContentBlockStop { index: 2 },
            StreamEvent::MessageDelta {
                delta: MessageDeltaInfo {
                    stop_reason: Some("tool_use".to_string()),
                    stop_sequence: None,
                },
            },
            StreamEvent::MessageStop,
        ]
    }

    fn run(events: &[StreamEvent]) -> (BlockAssembler, Vec<Applied>) {
        let mut asm = BlockAssembler::new();
        let applied = events.iter().map(|e| asm.apply(e).unwrap()).collect();
        (asm, applied)
    }

    #[test]
    fn one_block_per_start_with_concatenated_deltas() {
        let (asm, applied) = run(&mixed_turn());
        assert_eq!(
            asm.blocks(),
            &[
                ContentBlock::Thinking {
                    thinking: "need to look".to_string()
                },
                ContentBlock::text("Let me check."),
                ContentBlock::ToolUse {
                    id: "toolu_2".to_string(),
                    name: "list_files".to_string(),
                    input: "{\"path\":\".\"}".to_string(),
                },
            ]
        );
        assert_eq!(applied.last(), Some(&Applied::Finished));
        assert_eq!(asm.stop_reason(), Some("tool_use"));
        assert_eq!(
            tool_calls(asm.blocks()),
            vec![ToolCall {
                id: "toolu_2".to_string(),
                name: "list_files".to_string(),
                input: "{\"path\":\".\"}".to_string(),
            }]
        );
    }

    #[test]
    fn replay_is_identical() {
        let (a, _) = run(&mixed_turn());
        let (b, _) = run(&mixed_turn());
        assert_eq!(
            serde_json::to_string(a.blocks()).unwrap(),
            serde_json::to_string(b.blocks()).unwrap()
        );
    }

    #[test]
    fn informational_events_leave_blocks_alone() {
        let mut asm = BlockAssembler::new();
        assert_eq!(asm.apply(&StreamEvent::Ping).unwrap(), Applied::Unchanged);
        assert_eq!(
            asm.apply(&StreamEvent::ContentBlockStop { index: 9 }).unwrap(),
            Applied::Unchanged
        );
        assert!(asm.blocks().is_empty());
    }

    #[test]
    fn start_must_be_contiguous() {
        let mut asm = BlockAssembler::new();
        asm.apply(&start(0, "text")).unwrap();
        assert_eq!(
            asm.apply(&start(2, "text")),
            Err(AssembleError::OutOfOrderStart {
                expected: 1,
                got: 2
            })
        );
        assert_eq!(
            asm.apply(&start(0, "text")),
            Err(AssembleError::OutOfOrderStart {
                expected: 1,
                got: 0
            })
        );
    }

    #[test]
    fn delta_before_start_is_rejected() {
        let mut asm = BlockAssembler::new();
        assert_eq!(asm.apply(&text(0, "x")), Err(AssembleError::UnknownIndex(0)));
    }

    #[test]
    fn delta_kind_must_match_block() {
        let mut asm = BlockAssembler::new();
        asm.apply(&start(0, "text")).unwrap();
        assert_eq!(
            asm.apply(&json(0, "{}")),
            Err(AssembleError::KindMismatch {
                index: 0,
                block: "text",
                delta: "input_json_delta",
            })
        );
        assert_eq!(asm.blocks(), &[ContentBlock::text("")]);
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        let mut asm = BlockAssembler::new();
        assert_eq!(
            asm.apply(&start(0, "image")),
            Err(AssembleError::UnknownBlockType("image".to_string()))
        );
    }

    #[test]
    fn error_event_is_fatal() {
        let mut asm = BlockAssembler::new();
        let ev = StreamEvent::Error {
            error: ErrorInfo {
                kind: "overloaded_error".to_string(),
                message: "Overloaded".to_string(),
            },
        };
        assert_eq!(
            asm.apply(&ev),
            Err(AssembleError::Provider("Overloaded".to_string()))
        );
    }
}
