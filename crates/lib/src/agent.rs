//! Chat turn: append the user's message, stream the model's reply into the conversation, run any
//! tools it asks for, and re-call the model with the results until it answers without tools.
//!
//! Every intermediate state of the reply is persisted and pushed to the caller's channel, so a
//! front end can render the message as it grows.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::assembler::{tool_calls, AssembleError, Applied, BlockAssembler, ToolCall};
use crate::conversation::{ContentBlock, ConversationStore, Message, Role};
use crate::kv::StoreError;
use crate::llm::{
    EventStream, LlmBackend, LlmError, MessagesRequest, StreamEvent, WireContentBlock, WireMessage,
};
use crate::tools::{ToolInput, ToolRegistry};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 25;

/// Per-request model parameters and the tool loop guard.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_prompt: Option<String>,
    /// Model requests allowed in one send before giving up.
    pub max_tool_iterations: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: None,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("conversation {0} not found")]
    ConversationNotFound(String),
    #[error(transparent)]
    Transport(#[from] LlmError),
    #[error("malformed response stream: {0}")]
    Protocol(AssembleError),
    #[error("provider error: {0}")]
    Provider(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("model kept requesting tools after {0} requests")]
    ToolLoopLimit(usize),
}

impl From<AssembleError> for SendError {
    fn from(e: AssembleError) -> Self {
        match e {
            AssembleError::Provider(message) => SendError::Provider(message),
            other => SendError::Protocol(other),
        }
    }
}

/// Outcome of a completed send.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    /// Model requests issued.
    pub iterations: usize,
    /// Last assistant message (the one without tool calls).
    pub final_message: Message,
    /// `stop_reason` the provider gave for the last message, if any.
    pub stop_reason: Option<String>,
}

/// One streamed assistant message.
struct Reply {
    message: Message,
    /// `message_stop` was seen.
    finished: bool,
    stop_reason: Option<String>,
}

pub struct ChatAgent {
    store: Arc<ConversationStore>,
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
    /// One lock per conversation; sends to the same conversation run one after another.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatAgent {
    pub fn new(
        store: Arc<ConversationStore>,
        backend: Arc<dyn LlmBackend>,
        tools: Arc<ToolRegistry>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            store,
            backend,
            tools,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run [`ChatAgent::send_message`] on a task. Snapshots arrive on the receiver; the handle
    /// yields the outcome. Aborting the handle abandons the stream; the partial reply is
    /// stored as finished without its tool calls.
    pub fn spawn_send(
        self: &Arc<Self>,
        conversation_id: String,
        text: String,
        buffer: usize,
    ) -> (mpsc::Receiver<Message>, JoinHandle<Result<TurnSummary, SendError>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let agent = Arc::clone(self);
        let handle =
            tokio::spawn(async move { agent.send_message(&conversation_id, &text, &tx).await });
        (rx, handle)
    }

    /// Send `text` as the user and drive the tool loop to completion.
    ///
    /// Each new or changed message is pushed to `updates`. A closed receiver only stops the
    /// snapshots; the send itself carries on.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        updates: &mpsc::Sender<Message>,
    ) -> Result<TurnSummary, SendError> {
        let lock = self.conversation_lock(conversation_id).await;
        let _guard = lock.lock().await;

        if self.store.get_conversation(conversation_id).await.is_none() {
            return Err(SendError::ConversationNotFound(conversation_id.to_string()));
        }
        self.finish_interrupted(conversation_id).await?;
        let user = Message::new(conversation_id, Role::User, vec![ContentBlock::text(text)]);
        self.store.add_message(&user).await?;
        self.store.touch_conversation(conversation_id).await?;
        surface(updates, &user).await;

        let mut iterations = 0;
        loop {
            if iterations >= self.settings.max_tool_iterations {
                log::warn!(
                    "agent: {} stopped after {} model requests",
                    conversation_id,
                    iterations
                );
                return Err(SendError::ToolLoopLimit(iterations));
            }
            iterations += 1;

            let request = self.build_request(conversation_id).await;
            log::info!(
                "agent: request {} for {} ({} messages)",
                iterations,
                conversation_id,
                request.messages.len()
            );
            let events = self.backend.stream_messages(request).await?;
            let reply = self.stream_reply(conversation_id, events, updates).await?;
            if !reply.finished {
                log::warn!(
                    "agent: stream for {} ended before message_stop, requesting again",
                    conversation_id
                );
                continue;
            }

            let calls = tool_calls(&reply.message.content);
            if calls.is_empty() {
                return Ok(TurnSummary {
                    iterations,
                    final_message: reply.message,
                    stop_reason: reply.stop_reason,
                });
            }
            let results = self.run_tools(&calls).await;
            let results = Message::new(conversation_id, Role::User, results);
            self.store.add_message(&results).await?;
            surface(updates, &results).await;
        }
    }

    /// Finalize replies that a cancelled send left streaming, dropping their tool calls.
    async fn finish_interrupted(&self, conversation_id: &str) -> Result<(), SendError> {
        let interrupted = self
            .store
            .get_messages(conversation_id)
            .await
            .into_iter()
            .filter(|m| m.is_streaming);
        for mut message in interrupted {
            log::info!("agent: finishing interrupted reply {}", message.id);
            message.is_streaming = false;
            message.content = without_tool_uses(message.content);
            self.store.update_message(&message).await?;
        }
        Ok(())
    }

    async fn conversation_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn build_request(&self, conversation_id: &str) -> MessagesRequest {
        let history = self.store.get_messages(conversation_id).await;
        let definitions = self.tools.definitions();
        MessagesRequest {
            model: self.settings.model.clone(),
            messages: history.iter().filter_map(to_wire_message).collect(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: self
                .settings
                .system_prompt
                .clone()
                .filter(|s| !s.trim().is_empty()),
            stream: true,
            tools: (!definitions.is_empty()).then_some(definitions),
        }
    }

    /// Consume one event stream into a new assistant message.
    ///
    /// A reply that does not reach `message_stop` (stream ended, error, or the send was
    /// cancelled) is stored as finished without its tool calls, since those will never get
    /// results. No snapshot is sent after an error.
    async fn stream_reply(
        &self,
        conversation_id: &str,
        mut events: EventStream,
        updates: &mpsc::Sender<Message>,
    ) -> Result<Reply, SendError> {
        let mut message = Message::new(conversation_id, Role::Assistant, Vec::new());
        message.is_streaming = true;
        self.store.add_message(&message).await?;
        let mut guard = InterruptedReply {
            store: Arc::clone(&self.store),
            message: Some(message.clone()),
        };
        surface(updates, &message).await;

        let mut assembler = BlockAssembler::new();
        let outcome: Result<bool, SendError> = loop {
            let event = match events.next().await {
                None => break Ok(false),
                Some(Err(e)) => break Err(e.into()),
                Some(Ok(event)) => event,
            };
            if let StreamEvent::MessageStart { message: meta } = &event {
                log::debug!("agent: provider message {} from {}", meta.id, meta.model);
            }
            match assembler.apply(&event) {
                Ok(Applied::Unchanged) => {}
                Ok(Applied::Updated) => {
                    message.content = assembler.blocks().to_vec();
                    guard.message = Some(message.clone());
                    self.store.update_message(&message).await?;
                    surface(updates, &message).await;
                }
                Ok(Applied::Finished) => break Ok(true),
                Err(e) => break Err(e.into()),
            }
        };

        let stop_reason = assembler.stop_reason().map(str::to_string);
        let finished = matches!(outcome, Ok(true));
        message.content = assembler.into_blocks();
        if !finished {
            message.content = without_tool_uses(message.content);
        }
        message.is_streaming = false;
        self.store.update_message(&message).await?;
        guard.message = None;
        let finished = match outcome {
            Ok(finished) => finished,
            Err(e) => {
                log::warn!("agent: reply in {} aborted: {}", conversation_id, e);
                return Err(e);
            }
        };
        if finished {
            self.store.touch_conversation(conversation_id).await?;
        }
        surface(updates, &message).await;
        Ok(Reply {
            message,
            finished,
            stop_reason,
        })
    }

    /// Run each call in order; every outcome, failed or not, becomes a tool result.
    async fn run_tools(&self, calls: &[ToolCall]) -> Vec<ContentBlock> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let output = self.tools.execute_raw(&call.name, &call.input).await;
            results.push(ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content: output.output,
                is_error: output.is_error,
            });
        }
        results
    }
}

/// Stores the latest state of a reply as finished if it is dropped mid-stream.
struct InterruptedReply {
    store: Arc<ConversationStore>,
    message: Option<Message>,
}

impl Drop for InterruptedReply {
    fn drop(&mut self) {
        let Some(mut message) = self.message.take() else {
            return;
        };
        message.is_streaming = false;
        message.content = without_tool_uses(message.content);
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = store.update_message(&message).await {
                        log::warn!("agent: finishing interrupted reply {}: {}", message.id, e);
                    }
                });
            }
            Err(_) => log::warn!(
                "agent: reply {} left streaming, it is finished on the next send",
                message.id
            ),
        }
    }
}

fn without_tool_uses(blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    blocks
        .into_iter()
        .filter(|b| !matches!(b, ContentBlock::ToolUse { .. }))
        .collect()
}

async fn surface(updates: &mpsc::Sender<Message>, message: &Message) {
    if updates.send(message.clone()).await.is_err() {
        log::debug!("agent: snapshot receiver closed");
    }
}

/// Provider form of a stored message; `None` for messages with no content.
pub fn to_wire_message(message: &Message) -> Option<WireMessage> {
    if message.content.is_empty() {
        return None;
    }
    Some(WireMessage {
        role: message.role.as_str().to_string(),
        content: message.content.iter().map(to_wire_block).collect(),
    })
}

fn to_wire_block(block: &ContentBlock) -> WireContentBlock {
    match block {
        ContentBlock::Text { text } => WireContentBlock::Text { text: text.clone() },
        ContentBlock::Thinking { thinking } => WireContentBlock::Thinking {
            thinking: thinking.clone(),
        },
        ContentBlock::ToolUse { id, name, input } => WireContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            // The API wants an object here; keep unparseable input visible instead of dropping it.
            input: ToolInput::parse(input)
                .map(ToolInput::into_value)
                .unwrap_or_else(|_| json!({ "data": input })),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => WireContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        },
    }
}
