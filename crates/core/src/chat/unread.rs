//! Per-conversation unread counters.
//!
//! Rather than one `order id -> count` map shared by both sides, each
//! reader role has its own map (`chat_unread_customer`,
//! `chat_unread_driver`), so the customer's and the driver's counts for the
//! same order never overwrite each other. Both maps keep the `order id ->
//! count` shape. The sender increments the recipient's counter and
//! the recipient clears its own. Counts are not reconciled against the
//! message log, so a clear that races a send can leave them out of step.

use crate::chat::types::Role;
use crate::store::KeyValueStore;
use std::collections::BTreeMap;

type CountMap = BTreeMap<String, u32>;

/// Unread counter owned by one reader role.
#[derive(Debug, Clone)]
pub struct UnreadCounter {
    store: KeyValueStore,
    reader: Role,
    key: String,
}

impl UnreadCounter {
    pub fn new(store: KeyValueStore, reader: Role) -> Self {
        Self {
            store,
            reader,
            key: Self::key_for(reader),
        }
    }

    /// Store key of a reader's counters.
    pub fn key_for(reader: Role) -> String {
        format!("chat_unread_{}", reader.as_str())
    }

    pub fn reader(&self) -> Role {
        self.reader
    }

    fn load(&self) -> CountMap {
        self.store.get_or_default(&self.key)
    }

    /// Add one unread message. Returns the new count.
    pub fn increment(&self, conversation_id: &str) -> u32 {
        let mut counts = self.load();
        let count = counts.entry(conversation_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;
        self.store.set(&self.key, &counts);
        count
    }

    /// Reset a conversation's counter to zero.
    pub fn clear(&self, conversation_id: &str) {
        let mut counts = self.load();
        if counts.remove(conversation_id).is_some() {
            self.store.set(&self.key, &counts);
        }
    }

    /// Current count, 0 if never incremented.
    pub fn get(&self, conversation_id: &str) -> u32 {
        self.load().get(conversation_id).copied().unwrap_or(0)
    }

    /// Sum over all conversations.
    pub fn total(&self) -> u32 {
        self.load()
            .values()
            .fold(0u32, |total, count| total.saturating_add(*count))
    }
}
