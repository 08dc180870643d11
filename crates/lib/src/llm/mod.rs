//! Messages API transport: SSE framing, event types, wire request types and the HTTP client.
//!
//! The tool loop talks to the model through [`LlmBackend`] so it can be driven by a scripted
//! backend in tests; [`AnthropicClient`] is the real implementation.

mod anthropic;
mod events;
mod sse;
mod wire;

pub use anthropic::{AnthropicClient, DEFAULT_API_VERSION, DEFAULT_BASE_URL};
pub use events::{ContentBlockInfo, Delta, ErrorInfo, MessageDeltaInfo, MessageMetadata, StreamEvent};
pub use sse::{parse_sse_line, sse_events, SseLine, SseLineDecoder};
pub use wire::{MessagesRequest, ModelInfo, WireContentBlock, WireMessage};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Lazy, single-pass sequence of decoded events for one request.
pub type EventStream = BoxStream<'static, Result<StreamEvent, LlmError>>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("api error: {0}")]
    Api(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// A model endpoint that can stream one Messages API turn.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Issue the request with `stream = true` and return the event sequence.
    /// Fails before any event is produced on HTTP or network errors.
    async fn stream_messages(&self, request: MessagesRequest) -> Result<EventStream, LlmError>;
}
