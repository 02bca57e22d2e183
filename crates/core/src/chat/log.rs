//! Conversation-indexed append log on top of the key-value store.
//!
//! Store layout:
//! - `chat_conversations`: order id -> Conversation (one JSON map)
//!
//! Every mutation is a read-modify-write of the whole map. Two contexts
//! writing in the same instant can lose one of the writes.

use crate::chat::types::{now, ChatMessage, Conversation, Role};
use crate::store::KeyValueStore;
use std::collections::BTreeMap;
use tracing::debug;

/// Store key holding every conversation.
pub const CONVERSATIONS_KEY: &str = "chat_conversations";

type ConversationMap = BTreeMap<String, Conversation>;

/// Result of [`MessageLog::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was added.
    Inserted,
    /// A message with the same id already exists; nothing changed.
    Duplicate,
    /// The store refused the write.
    WriteFailed,
}

/// Append-only message history per conversation.
#[derive(Debug, Clone)]
pub struct MessageLog {
    store: KeyValueStore,
}

impl MessageLog {
    pub fn new(store: KeyValueStore) -> Self {
        Self { store }
    }

    /// The underlying store handle.
    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }

    fn load(&self) -> ConversationMap {
        self.store.get_or_default(CONVERSATIONS_KEY)
    }

    fn save(&self, conversations: &ConversationMap) -> bool {
        self.store.set(CONVERSATIONS_KEY, conversations)
    }

    /// Append a message, creating the conversation on first use.
    ///
    /// Appending an id that is already present is a no-op, so retried sends
    /// are safe.
    pub fn append(&self, conversation_id: &str, message: ChatMessage) -> AppendOutcome {
        let mut conversations = self.load();
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation::new(conversation_id));

        if conversation.contains(&message.id) {
            debug!("Skipping duplicate message {} in {}", message.id, conversation_id);
            return AppendOutcome::Duplicate;
        }

        conversation.last_message_time = message.timestamp;
        conversation.messages.push(message);

        if self.save(&conversations) {
            AppendOutcome::Inserted
        } else {
            AppendOutcome::WriteFailed
        }
    }

    /// All messages of a conversation in insertion order.
    pub fn get_all(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.load()
            .remove(conversation_id)
            .map(|c| c.messages)
            .unwrap_or_default()
    }

    /// Get a conversation record.
    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.load().remove(conversation_id)
    }

    /// All conversations, most recently active first.
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut conversations: Vec<_> = self.load().into_values().collect();
        conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        conversations
    }

    /// Empty a conversation's messages but keep its record.
    ///
    /// Returns `false` if the store refused the write. Clearing an unknown
    /// conversation is a successful no-op.
    pub fn clear(&self, conversation_id: &str) -> bool {
        let mut conversations = self.load();
        let Some(conversation) = conversations.get_mut(conversation_id) else {
            return true;
        };

        let cleared_at = now();
        conversation.messages.clear();
        conversation.last_message_time = cleared_at;
        conversation.cleared_at = Some(cleared_at);
        self.save(&conversations)
    }

    /// Mark every message not authored by `reader` as read.
    ///
    /// Returns how many messages changed. Nothing is written when none did.
    pub fn mark_read(&self, conversation_id: &str, reader: Role) -> usize {
        let mut conversations = self.load();
        let Some(conversation) = conversations.get_mut(conversation_id) else {
            return 0;
        };

        let mut changed = 0;
        for message in conversation
            .messages
            .iter_mut()
            .filter(|m| m.is_incoming_for(reader) && !m.read)
        {
            message.read = true;
            changed += 1;
        }

        if changed > 0 && !self.save(&conversations) {
            return 0;
        }
        changed
    }
}
