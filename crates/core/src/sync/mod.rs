//! Cross-context chat synchronization.
//!
//! Endpoints never talk to each other directly. They append to the shared
//! [`MessageLog`](crate::chat::MessageLog) and each runs a
//! [`ChatSyncChannel`] that notices the counterpart's appends:
//!
//! - [`channel`]: the watermark state machine and listener dispatch
//! - [`notifier`]: push, poll and manual wake-up sources
//! - [`registry`]: one active, task-driven channel per conversation and role

pub mod channel;
pub mod notifier;
pub mod registry;

pub use channel::{ChatSyncChannel, Listeners, ReconcileOutcome, Reconciliation};
pub use notifier::{ManualTrigger, Notifier, Trigger};
pub use registry::{ChannelKey, SyncHandle, SyncRegistry};
