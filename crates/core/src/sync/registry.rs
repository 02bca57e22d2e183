//! Active sync channels of one process.
//!
//! The registry keeps at most one channel per conversation and role.
//! Registering again replaces the previous channel and stops its driver,
//! so re-initialising an endpoint never leaves a second poll loop behind.

use crate::chat::types::Role;
use crate::sync::channel::{ChatSyncChannel, Listeners, ReconcileOutcome};
use crate::sync::notifier::Notifier;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Registry key: one active channel per conversation and role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub conversation_id: String,
    pub role: Role,
}

impl ChannelKey {
    pub fn new(conversation_id: impl Into<String>, role: Role) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role,
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.conversation_id, self.role)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A channel together with the callbacks its passes are dispatched to.
///
/// Channel state and listeners sit behind separate locks, so a listener
/// can call back into the endpoint (send, clear) without deadlocking.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    channel: Arc<Mutex<ChatSyncChannel>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl SyncHandle {
    pub fn new(channel: ChatSyncChannel, listeners: Listeners) -> Self {
        Self {
            channel: Arc::new(Mutex::new(channel)),
            listeners: Arc::new(Mutex::new(listeners)),
        }
    }

    /// Run one reconcile pass and dispatch its result.
    ///
    /// The listeners lock is held across the whole pass, so concurrent
    /// passes dispatch in the order they computed. The channel lock is only
    /// held while diffing.
    pub fn reconcile(&self) -> ReconcileOutcome {
        let mut listeners = lock(&self.listeners);
        let reconciliation = lock(&self.channel).reconcile();
        listeners.dispatch(reconciliation)
    }

    /// See [`ChatSyncChannel::acknowledge_clear`].
    pub fn acknowledge_clear(&self) {
        lock(&self.channel).acknowledge_clear();
    }

    /// Borrow the channel state.
    pub fn channel(&self) -> MutexGuard<'_, ChatSyncChannel> {
        lock(&self.channel)
    }
}

struct ActiveChannel {
    handle: SyncHandle,
    driver: Option<JoinHandle<()>>,
}

impl ActiveChannel {
    fn stop(self) {
        if let Some(driver) = self.driver {
            driver.abort();
        }
    }
}

/// Process-local table of active channels.
#[derive(Default)]
pub struct SyncRegistry {
    active: Mutex<HashMap<ChannelKey, ActiveChannel>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel without a driver; the caller reconciles by hand.
    pub fn register(&self, channel: ChatSyncChannel, listeners: Listeners) -> SyncHandle {
        let key = ChannelKey::new(channel.conversation_id(), channel.role());
        let handle = SyncHandle::new(channel, listeners);
        self.insert(key, handle.clone(), None);
        handle
    }

    /// Register a channel and drive it from `notifier` on a Tokio task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(&self, channel: ChatSyncChannel, listeners: Listeners, notifier: Notifier) -> SyncHandle {
        let key = ChannelKey::new(channel.conversation_id(), channel.role());
        let handle = SyncHandle::new(channel, listeners);
        let driver = tokio::spawn(drive(key.clone(), handle.clone(), notifier));
        self.insert(key, handle.clone(), Some(driver));
        handle
    }

    fn insert(&self, key: ChannelKey, handle: SyncHandle, driver: Option<JoinHandle<()>>) {
        let previous = lock(&self.active).insert(key.clone(), ActiveChannel { handle, driver });
        if let Some(previous) = previous {
            debug!("Replacing active sync channel {}", key);
            previous.stop();
        }
    }

    /// Handle of the active channel for `key`, if any.
    pub fn get(&self, key: &ChannelKey) -> Option<SyncHandle> {
        lock(&self.active).get(key).map(|a| a.handle.clone())
    }

    /// Whether `key`'s driver task is still running.
    pub fn is_driving(&self, key: &ChannelKey) -> bool {
        lock(&self.active)
            .get(key)
            .and_then(|a| a.driver.as_ref())
            .is_some_and(|d| !d.is_finished())
    }

    /// Stop and forget a channel. Returns `false` if none was active.
    pub fn deactivate(&self, key: &ChannelKey) -> bool {
        match lock(&self.active).remove(key) {
            Some(active) => {
                active.stop();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every driver.
    pub fn shutdown(&self) {
        for (key, active) in lock(&self.active).drain() {
            trace!("Stopping sync channel {}", key);
            active.stop();
        }
    }
}

impl Drop for SyncRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn drive(key: ChannelKey, handle: SyncHandle, mut notifier: Notifier) {
    while let Some(trigger) = notifier.next().await {
        let outcome = handle.reconcile();
        trace!("{:?} trigger on {}: {:?}", trigger, key, outcome);
    }
    debug!("Sync channel {} has no trigger sources left", key);
}
