//! Sync Integration Tests
//!
//! These tests run customer and driver endpoints with real driver tasks,
//! the way two browser tabs share one origin:
//!
//! - same-process contexts over one store (push notifications + poll)
//! - separate store handles on one directory (poll only, like two processes)

mod common;

use common::{forwarding_listeners, next_message, with_timeout, Observed, FAST_POLL};
use ridechat_core::chat::{CustomerChatEndpoint, DriverChatEndpoint, Role};
use ridechat_core::store::{FileBackend, KeyValueStore, SledBackend};
use ridechat_core::sync::{ChannelKey, SyncRegistry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ORDER: &str = "ORD-2024-0042";

/// Long enough that only push notifications can explain a quick delivery.
const SLOW_POLL: Duration = Duration::from_secs(600);

#[tokio::test]
async fn test_push_notification_delivers_without_polling() {
    common::init_test_logging();

    let store = KeyValueStore::in_memory();
    let registry = Arc::new(SyncRegistry::new());
    let customer = CustomerChatEndpoint::new(store.attach(), ORDER, Arc::clone(&registry));
    let mut driver =
        DriverChatEndpoint::new(store.attach(), ORDER, registry).with_poll_interval(SLOW_POLL);

    let (listeners, mut rx) = forwarding_listeners();
    driver.init(listeners);
    // Let the immediate first poll tick run
    tokio::task::yield_now().await;

    customer.send_text_with_id("m1", "Hi, I'm wearing a red jacket");
    let message = next_message(&mut rx).await;
    assert_eq!(message.id.as_str(), "m1");
    assert_eq!(message.sender, Role::Customer);
}

#[tokio::test]
async fn test_poll_only_across_separate_store_handles() {
    let temp_dir = TempDir::new().unwrap();

    // Two handles on one directory share no notification bus
    let customer_store = KeyValueStore::new(FileBackend::open(temp_dir.path()).unwrap());
    let driver_store = KeyValueStore::new(FileBackend::open(temp_dir.path()).unwrap());

    let customer =
        CustomerChatEndpoint::new(customer_store, ORDER, Arc::new(SyncRegistry::new()));
    let mut driver = DriverChatEndpoint::new(driver_store, ORDER, Arc::new(SyncRegistry::new()))
        .with_poll_interval(FAST_POLL);

    let (listeners, mut rx) = forwarding_listeners();
    driver.init(listeners);

    for (id, text) in [("a", "first"), ("b", "second"), ("c", "third")] {
        assert!(customer.send_text_with_id(id, text).is_sent());
    }

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(next_message(&mut rx).await.id.0);
    }
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(driver.unread_count(), 3);
}

#[tokio::test]
async fn test_history_clear_propagates() {
    let store = KeyValueStore::in_memory();
    let registry = Arc::new(SyncRegistry::new());
    let mut customer = CustomerChatEndpoint::new(store.attach(), ORDER, Arc::clone(&registry))
        .with_poll_interval(FAST_POLL);
    let mut driver =
        DriverChatEndpoint::new(store.attach(), ORDER, registry).with_poll_interval(FAST_POLL);

    let (customer_listeners, mut customer_rx) = forwarding_listeners();
    let (driver_listeners, mut driver_rx) = forwarding_listeners();
    customer.init(customer_listeners);
    driver.init(driver_listeners);

    customer.send_text("Where are you?");
    customer.send_text("I'm by the taxi rank");
    next_message(&mut driver_rx).await;
    next_message(&mut driver_rx).await;

    assert!(customer.delete_history());

    match with_timeout(driver_rx.recv()).await {
        Some(Observed::Cleared) => {}
        other => panic!("expected clear notification, got {:?}", other),
    }

    // Nothing stale comes back after the clear
    driver.send_text("Sorry, traffic");
    let reply = next_message(&mut customer_rx).await;
    assert_eq!(reply.content, "Sorry, traffic");
    assert!(driver_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_reinit_replaces_driver_task() {
    let store = KeyValueStore::in_memory();
    let registry = Arc::new(SyncRegistry::new());
    let customer = CustomerChatEndpoint::new(store.attach(), ORDER, Arc::clone(&registry));
    let mut driver = DriverChatEndpoint::new(store.attach(), ORDER, Arc::clone(&registry))
        .with_poll_interval(FAST_POLL);

    let (first, mut first_rx) = forwarding_listeners();
    driver.init(first);
    let (second, mut second_rx) = forwarding_listeners();
    driver.init(second);

    assert_eq!(registry.len(), 1);
    assert!(registry.is_driving(&ChannelKey::new(ORDER, Role::Driver)));

    customer.send_text_with_id("only-once", "Ready when you are");
    let message = next_message(&mut second_rx).await;
    assert_eq!(message.id.as_str(), "only-once");

    // The replaced channel's listeners were dropped with its task
    assert!(with_timeout(first_rx.recv()).await.is_none());

    tokio::time::sleep(FAST_POLL * 5).await;
    assert!(second_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unread_lifecycle_over_shared_directory() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(SyncRegistry::new());
    let customer = CustomerChatEndpoint::new(
        KeyValueStore::new(FileBackend::open(temp_dir.path()).unwrap()),
        ORDER,
        Arc::clone(&registry),
    );
    let driver = DriverChatEndpoint::new(
        KeyValueStore::new(FileBackend::open(temp_dir.path()).unwrap()),
        ORDER,
        registry,
    );

    for text in ["Hello", "Gate B", "Thanks"] {
        customer.send_text(text);
    }
    assert_eq!(driver.unread_count(), 3);

    assert_eq!(driver.mark_all_read(), 3);
    assert_eq!(driver.unread_count(), 0);
    assert!(customer.history().iter().all(|m| m.read));
}

#[tokio::test]
async fn test_sled_backend_in_process() {
    let store = KeyValueStore::new(SledBackend::temporary().unwrap());
    let registry = Arc::new(SyncRegistry::new());
    let driver = DriverChatEndpoint::new(store.attach(), ORDER, Arc::clone(&registry));
    let mut customer = CustomerChatEndpoint::new(store.attach(), ORDER, registry)
        .with_poll_interval(SLOW_POLL);

    let (listeners, mut rx) = forwarding_listeners();
    customer.init(listeners);
    tokio::task::yield_now().await;

    driver.send_image("data:image/png;base64,iVBORw0KGgo=", "pickup.png");
    let message = next_message(&mut rx).await;
    assert_eq!(message.content, "pickup.png");
    assert_eq!(customer.unread_count(), 1);
}
