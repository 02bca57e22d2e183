//! Common test utilities for integration tests.
//!
//! Shared helpers for driving customer and driver endpoints against one
//! store, the way two browser tabs would.

use ridechat_core::chat::ChatMessage;
use ridechat_core::sync::Listeners;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default timeout for test operations.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval used by spawned channels in tests.
pub const FAST_POLL: Duration = Duration::from_millis(20);

/// Initialize test logging with appropriate filters.
///
/// Call this at the start of tests that need debug output.
/// Safe to call multiple times (subsequent calls are no-ops).
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ridechat_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Run an async operation with a timeout.
///
/// Returns the result if the operation completes within the timeout,
/// or panics with a timeout message if it doesn't.
#[allow(dead_code)]
pub async fn with_timeout<T, F>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("Test operation timed out")
}

/// What a listener observed.
#[derive(Debug)]
#[allow(dead_code)]
pub enum Observed {
    Message(ChatMessage),
    Cleared,
}

/// Listeners that forward everything into a channel.
#[allow(dead_code)]
pub fn forwarding_listeners() -> (Listeners, mpsc::UnboundedReceiver<Observed>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let clear_tx = tx.clone();
    let listeners = Listeners::new(move |m| {
        let _ = tx.send(Observed::Message(m));
    })
    .on_history_cleared(move || {
        let _ = clear_tx.send(Observed::Cleared);
    });
    (listeners, rx)
}

/// Wait for the next delivered message, skipping nothing.
#[allow(dead_code)]
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<Observed>) -> ChatMessage {
    match with_timeout(rx.recv()).await {
        Some(Observed::Message(m)) => m,
        other => panic!("expected a message, got {:?}", other),
    }
}
