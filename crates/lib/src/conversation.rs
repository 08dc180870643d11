//! Conversations and their message logs.
//!
//! Messages hold ordered content blocks (text, thinking, tool use, tool result). The store keeps
//! the conversation list under `conversations` and each log under `messages_<id>` in a flat
//! key-value store of JSON blobs. Corrupt blobs read as empty rather than failing the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};

use crate::kv::{KeyValueStore, StoreError};

const CONVERSATIONS_KEY: &str = "conversations";

/// Unique conversation identifier (opaque string).
pub type ConversationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One typed unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Model reasoning; shown collapsed by front ends.
    Thinking {
        thinking: String,
    },
    /// Requested tool call. `input` is the raw JSON accumulated from the stream and is only
    /// guaranteed to parse once the message has finished streaming.
    ToolUse {
        id: String,
        name: String,
        input: String,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Wire name of the block kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::Thinking { .. } => "thinking",
            ContentBlock::ToolUse { .. } => "tool_use",
            ContentBlock::ToolResult { .. } => "tool_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    pub fn new(conversation_id: impl Into<String>, role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: generate_id("msg"),
            conversation_id: conversation_id.into(),
            role,
            content,
            timestamp: now_millis(),
            is_streaming: false,
        }
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub message_count: u32,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: generate_id("conv"),
            title: title.into(),
            created_at: now,
            updated_at: now,
            message_count: 0,
        }
    }

    /// Bump the updated timestamp and message count after a completed turn.
    pub fn touched(mut self) -> Self {
        self.updated_at = now_millis().max(self.updated_at);
        self.message_count += 1;
        self
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

fn messages_key(conversation_id: &str) -> String {
    format!("messages_{}", conversation_id)
}

/// Conversation metadata plus per-conversation message logs.
///
/// The conversation list is cached in memory and published on a watch channel, so observers
/// can follow it without polling.
pub struct ConversationStore {
    kv: Arc<dyn KeyValueStore>,
    conversations: RwLock<Vec<Conversation>>,
    /// Serialises read-modify-write of message logs.
    messages_lock: Mutex<()>,
    updates: watch::Sender<Vec<Conversation>>,
}

impl ConversationStore {
    /// Load the conversation list from `kv`.
    pub async fn open(kv: Arc<dyn KeyValueStore>) -> Self {
        let conversations: Vec<Conversation> = load_json(kv.as_ref(), CONVERSATIONS_KEY).await;
        let (updates, _) = watch::channel(conversations.clone());
        Self {
            kv,
            conversations: RwLock::new(conversations),
            messages_lock: Mutex::new(()),
            updates,
        }
    }

    /// Current conversation list now and after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Conversation>> {
        self.updates.subscribe()
    }

    pub async fn list_conversations(&self) -> Vec<Conversation> {
        self.conversations.read().await.clone()
    }

    pub async fn get_conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn create_conversation(&self, title: impl Into<String>) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);
        let mut g = self.conversations.write().await;
        g.push(conversation.clone());
        self.save_conversations(&g).await?;
        Ok(conversation)
    }

    /// Replace the conversation with the same id; unknown ids are ignored.
    pub async fn update_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut g = self.conversations.write().await;
        let Some(slot) = g.iter_mut().find(|c| c.id == conversation.id) else {
            log::debug!("store: update for unknown conversation {}", conversation.id);
            return Ok(());
        };
        *slot = conversation.clone();
        self.save_conversations(&g).await
    }

    /// Apply [`Conversation::touched`] to the stored conversation and return the result.
    pub async fn touch_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let mut g = self.conversations.write().await;
        let Some(slot) = g.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        *slot = slot.clone().touched();
        let updated = slot.clone();
        self.save_conversations(&g).await?;
        Ok(Some(updated))
    }

    /// Delete a conversation together with its messages.
    pub async fn delete_conversation(&self, id: &str) -> Result<(), StoreError> {
        let mut g = self.conversations.write().await;
        g.retain(|c| c.id != id);
        self.save_conversations(&g).await?;
        let _lock = self.messages_lock.lock().await;
        self.kv.remove(&messages_key(id)).await
    }

    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let mut g = self.conversations.write().await;
        {
            let _lock = self.messages_lock.lock().await;
            for c in g.iter() {
                self.kv.remove(&messages_key(&c.id)).await?;
            }
        }
        g.clear();
        self.save_conversations(&g).await
    }

    /// Messages of a conversation in append order; empty when none or unreadable.
    pub async fn get_messages(&self, conversation_id: &str) -> Vec<Message> {
        load_json(self.kv.as_ref(), &messages_key(conversation_id)).await
    }

    pub async fn add_message(&self, message: &Message) -> Result<(), StoreError> {
        let _lock = self.messages_lock.lock().await;
        let mut messages = self.get_messages(&message.conversation_id).await;
        messages.push(message.clone());
        self.save_messages(&message.conversation_id, &messages).await
    }

    /// Replace the stored message with the same id.
    pub async fn update_message(&self, message: &Message) -> Result<(), StoreError> {
        let _lock = self.messages_lock.lock().await;
        let mut messages = self.get_messages(&message.conversation_id).await;
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => *slot = message.clone(),
            None => {
                log::debug!("store: update for unknown message {}", message.id);
                return Ok(());
            }
        }
        self.save_messages(&message.conversation_id, &messages).await
    }

    async fn save_conversations(&self, conversations: &[Conversation]) -> Result<(), StoreError> {
        save_json(self.kv.as_ref(), CONVERSATIONS_KEY, &conversations).await?;
        self.updates.send_replace(conversations.to_vec());
        Ok(())
    }

    async fn save_messages(&self, conversation_id: &str, messages: &[Message]) -> Result<(), StoreError> {
        save_json(self.kv.as_ref(), &messages_key(conversation_id), &messages).await
    }
}

async fn load_json<T: serde::de::DeserializeOwned + Default>(kv: &dyn KeyValueStore, key: &str) -> T {
    let raw = match kv.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            log::warn!("store: reading {} failed, using empty value: {}", key, e);
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("store: {} is corrupt, using empty value: {}", key, e);
            T::default()
        }
    }
}

async fn save_json<T: Serialize + ?Sized>(kv: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    kv.put(key, &raw).await
}
