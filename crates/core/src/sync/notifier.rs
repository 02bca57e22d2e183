//! Trigger sources that wake a sync channel.
//!
//! A [`Notifier`] merges up to three sources into one stream of
//! [`Trigger`]s:
//!
//! - **push**: change events from other contexts sharing the store
//! - **poll**: a fixed interval, which also covers writes the push source
//!   cannot see (other processes, missed events)
//! - **manual**: explicit wake-ups through a [`ManualTrigger`]
//!
//! Every trigger leads to the same full reconcile, so a spurious wake-up
//! costs one read and nothing else.

use crate::store::{ContextId, KeyValueStore, StorageEvent};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::trace;

/// Why a channel was woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Push,
    Poll,
    Manual,
}

/// Handle for waking a notifier by hand.
#[derive(Debug, Clone)]
pub struct ManualTrigger(mpsc::UnboundedSender<()>);

impl ManualTrigger {
    /// Request a reconcile. Returns `false` once the notifier is gone.
    pub fn fire(&self) -> bool {
        self.0.send(()).is_ok()
    }
}

struct PushSource {
    events: broadcast::Receiver<StorageEvent>,
    context: ContextId,
    keys: Vec<String>,
}

enum PushEvent {
    Relevant,
    Ignored,
    Closed,
}

impl PushSource {
    async fn recv(&mut self) -> PushEvent {
        match self.events.recv().await {
            Ok(event) if event.origin != self.context && self.keys.contains(&event.key) => {
                PushEvent::Relevant
            }
            Ok(_) => PushEvent::Ignored,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Something changed; a full reconcile catches up
                trace!("Push source lagged by {} event(s)", skipped);
                PushEvent::Relevant
            }
            Err(broadcast::error::RecvError::Closed) => PushEvent::Closed,
        }
    }
}

enum Step {
    Push(PushEvent),
    Poll,
    Manual(bool),
}

/// Merged trigger stream for one channel.
#[derive(Default)]
pub struct Notifier {
    push: Option<PushSource>,
    poll: Option<Interval>,
    manual: Option<mpsc::UnboundedReceiver<()>>,
}

impl Notifier {
    /// A notifier with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake on changes to any of `keys` made by contexts other than `store`'s.
    pub fn with_push<I, K>(mut self, store: &KeyValueStore, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.push = Some(PushSource {
            events: store.subscribe(),
            context: store.context(),
            keys: keys.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Wake every `period`, starting immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_poll(mut self, period: Duration) -> Self {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.poll = Some(interval);
        self
    }

    /// Add a manual source and return its handle.
    pub fn with_manual(mut self) -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.manual = Some(rx);
        (self, ManualTrigger(tx))
    }

    /// True when no source is left.
    pub fn is_exhausted(&self) -> bool {
        self.push.is_none() && self.poll.is_none() && self.manual.is_none()
    }

    /// Wait for the next trigger. Returns `None` once every source has closed.
    pub async fn next(&mut self) -> Option<Trigger> {
        loop {
            if self.is_exhausted() {
                return None;
            }

            let step = {
                let Self { push, poll, manual } = &mut *self;
                tokio::select! {
                    event = next_push(push) => Step::Push(event),
                    _ = next_tick(poll) => Step::Poll,
                    open = next_manual(manual) => Step::Manual(open),
                }
            };

            match step {
                Step::Push(PushEvent::Relevant) => return Some(Trigger::Push),
                Step::Push(PushEvent::Ignored) => continue,
                Step::Push(PushEvent::Closed) => {
                    trace!("Push source closed");
                    self.push = None;
                }
                Step::Poll => return Some(Trigger::Poll),
                Step::Manual(true) => return Some(Trigger::Manual),
                Step::Manual(false) => {
                    trace!("Manual source closed");
                    self.manual = None;
                }
            }
        }
    }
}

async fn next_push(push: &mut Option<PushSource>) -> PushEvent {
    match push {
        Some(source) => source.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_manual(manual: &mut Option<mpsc::UnboundedReceiver<()>>) -> bool {
    match manual {
        Some(rx) => rx.recv().await.is_some(),
        None => std::future::pending().await,
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("push", &self.push.is_some())
            .field("poll", &self.poll.as_ref().map(|i| i.period()))
            .field("manual", &self.manual.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "chat_conversations";

    #[tokio::test]
    async fn test_empty_notifier_is_exhausted() {
        let mut notifier = Notifier::new();
        assert!(notifier.is_exhausted());
        assert_eq!(notifier.next().await, None);
    }

    #[tokio::test]
    async fn test_manual_trigger() {
        let (mut notifier, trigger) = Notifier::new().with_manual();
        assert!(trigger.fire());
        assert_eq!(notifier.next().await, Some(Trigger::Manual));

        drop(trigger);
        assert_eq!(notifier.next().await, None);
    }

    #[tokio::test]
    async fn test_push_ignores_own_context_and_other_keys() {
        let store = KeyValueStore::in_memory();
        let other = store.attach();
        let (notifier, trigger) = Notifier::new().with_push(&store, [KEY]).with_manual();
        let mut notifier = notifier;

        store.set(KEY, &1u8);
        other.set("unrelated", &1u8);
        other.set(KEY, &2u8);

        // The first two events are skipped
        assert_eq!(notifier.next().await, Some(Trigger::Push));

        trigger.fire();
        assert_eq!(notifier.next().await, Some(Trigger::Manual));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_ticks() {
        let mut notifier = Notifier::new().with_poll(Duration::from_millis(1500));

        // First tick is immediate
        assert_eq!(notifier.next().await, Some(Trigger::Poll));

        let started = time::Instant::now();
        assert_eq!(notifier.next().await, Some(Trigger::Poll));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }
}
