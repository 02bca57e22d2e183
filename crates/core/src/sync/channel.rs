//! Watermark-based change detection over a shared message log.
//!
//! A [`ChatSyncChannel`] belongs to one endpoint context and one
//! conversation. Each call to [`ChatSyncChannel::reconcile`] re-reads the
//! whole conversation and returns the counterpart's messages that sort after
//! the watermark, in delivery order. Because every pass starts from full
//! state, a failed or missed pass is repaired by the next one.
//!
//! Delivery order is `(timestamp, log position)`. Messages that share a
//! timestamp are delivered in the order they were appended. A message that
//! arrives with a timestamp below the watermark is never delivered.
//!
//! A shrinking log is read as an external history clear. A clear followed
//! by enough new messages to reach the old length before the next pass goes
//! unnoticed. A conversation record that cannot be read is a failed pass,
//! not a clear.

use crate::chat::log::MessageLog;
use crate::chat::types::{now, ChatMessage, OrderKey, Role};
use chrono::{DateTime, Utc};
use tracing::debug;

/// What a reconcile pass found.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Nothing new.
    Idle,
    /// New counterpart messages in delivery order.
    Delivered(Vec<ChatMessage>),
    /// The history was cleared elsewhere.
    Cleared,
}

/// Summary of a dispatched reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Idle,
    Delivered(usize),
    Cleared,
}

/// Sync state for one (context, conversation) pair.
#[derive(Debug)]
pub struct ChatSyncChannel {
    log: MessageLog,
    conversation_id: String,
    role: Role,
    watermark: OrderKey,
    last_observed_count: usize,
}

impl ChatSyncChannel {
    /// Start watching `conversation_id` as `role`.
    ///
    /// The watermark starts at the newest existing message, so history that
    /// predates the channel is never delivered as new.
    pub fn init(log: MessageLog, conversation_id: impl Into<String>, role: Role) -> Self {
        let conversation_id = conversation_id.into();
        let messages = log.get_all(&conversation_id);

        let watermark = messages
            .iter()
            .enumerate()
            .map(|(position, m)| OrderKey::new(m.timestamp, position))
            .max()
            .unwrap_or_else(|| OrderKey::floor(DateTime::<Utc>::UNIX_EPOCH));

        debug!(
            "Sync channel for {} as {} starts at {} with {} message(s)",
            conversation_id,
            role,
            watermark.timestamp,
            messages.len()
        );

        Self {
            log,
            conversation_id,
            role,
            watermark,
            last_observed_count: messages.len(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn watermark(&self) -> OrderKey {
        self.watermark
    }

    pub fn last_observed_count(&self) -> usize {
        self.last_observed_count
    }

    /// Diff the persisted log against the watermark.
    pub fn reconcile(&mut self) -> Reconciliation {
        // Records are never removed, so a missing one is a failed read
        let Some(conversation) = self.log.conversation(&self.conversation_id) else {
            if self.last_observed_count > 0 {
                debug!("Conversation {} unreadable this pass", self.conversation_id);
            }
            return Reconciliation::Idle;
        };
        let (messages, cleared_at) = (conversation.messages, conversation.cleared_at);

        if messages.len() < self.last_observed_count {
            debug!(
                "History of {} shrank from {} to {} message(s); treating as cleared",
                self.conversation_id,
                self.last_observed_count,
                messages.len()
            );
            // Messages appended after the clear are picked up on the next pass
            self.reset_to(cleared_at.unwrap_or_else(now));
            return Reconciliation::Cleared;
        }
        self.last_observed_count = messages.len();

        let watermark = self.watermark;
        let role = self.role;
        let mut fresh: Vec<(OrderKey, ChatMessage)> = messages
            .into_iter()
            .enumerate()
            .map(|(position, m)| (OrderKey::new(m.timestamp, position), m))
            .filter(|(key, m)| m.is_incoming_for(role) && *key > watermark)
            .collect();

        if fresh.is_empty() {
            return Reconciliation::Idle;
        }

        fresh.sort_by_key(|(key, _)| *key);
        if let Some((newest, _)) = fresh.last() {
            self.watermark = *newest;
        }

        debug!(
            "Delivering {} message(s) in {} to {}",
            fresh.len(),
            self.conversation_id,
            self.role
        );
        Reconciliation::Delivered(fresh.into_iter().map(|(_, m)| m).collect())
    }

    /// Record a clear made by this context so it is not read as external.
    pub fn acknowledge_clear(&mut self) {
        self.reset_to(now());
    }

    /// Everything stamped before `at` is considered seen. Messages stamped in
    /// the same millisecond as the clear still sort above the watermark.
    fn reset_to(&mut self, at: DateTime<Utc>) {
        self.watermark = OrderKey::floor(at - chrono::Duration::milliseconds(1));
        self.last_observed_count = 0;
    }
}

type MessageCallback = Box<dyn FnMut(ChatMessage) + Send>;
type ClearCallback = Box<dyn FnMut() + Send>;

/// Callbacks a reconcile pass is dispatched to.
///
/// Callbacks run on the driving task. They may send, mark read or delete
/// history, but must not reconcile the same channel.
pub struct Listeners {
    on_message: MessageCallback,
    on_cleared: Option<ClearCallback>,
}

impl Listeners {
    pub fn new(on_message: impl FnMut(ChatMessage) + Send + 'static) -> Self {
        Self {
            on_message: Box::new(on_message),
            on_cleared: None,
        }
    }

    pub fn on_history_cleared(mut self, on_cleared: impl FnMut() + Send + 'static) -> Self {
        self.on_cleared = Some(Box::new(on_cleared));
        self
    }

    /// Invoke the callbacks for one pass.
    pub fn dispatch(&mut self, reconciliation: Reconciliation) -> ReconcileOutcome {
        match reconciliation {
            Reconciliation::Idle => ReconcileOutcome::Idle,
            Reconciliation::Delivered(messages) => {
                let count = messages.len();
                for message in messages {
                    (self.on_message)(message);
                }
                ReconcileOutcome::Delivered(count)
            }
            Reconciliation::Cleared => {
                if let Some(on_cleared) = self.on_cleared.as_mut() {
                    on_cleared();
                }
                ReconcileOutcome::Cleared
            }
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("on_cleared", &self.on_cleared.is_some())
            .finish_non_exhaustive()
    }
}
