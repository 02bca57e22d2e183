//! Ridechat Core Library
//!
//! This crate provides chat between the customer and the driver of a ride,
//! synchronized purely through a shared local key-value store:
//!
//! - Fault-tolerant store handles with change notification
//! - Deduplicating per-order message log and unread counters
//! - Watermark-based sync channels driven by push and poll triggers
//! - Customer and driver endpoint facades
//!
//! It is used by the `ridechat` command-line front end.

pub mod chat;
pub mod config;
pub mod error;
pub mod platform;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use chat::{
    ChatMessage, Conversation, CustomerChatEndpoint, DriverChatEndpoint, Identity, MessageLog, Role,
    SendOutcome, UnreadCounter,
};
pub use config::Config;
pub use error::{Error, Result};
pub use store::{BackendKind, KeyValueStore};
pub use sync::{ChatSyncChannel, Listeners, Notifier, ReconcileOutcome, SyncRegistry};
