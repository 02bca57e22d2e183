//! Subcommand implementations.

pub mod clear;
pub mod config;
pub mod history;
pub mod notice;
pub mod read;
pub mod send;
pub mod send_image;
pub mod status;
pub mod unread;
pub mod watch;

use anyhow::{Context, Result};
use ridechat_core::chat::{ChatEndpoint, ChatMessage, EndpointRole, MessageKind, SendOutcome};
use ridechat_core::{Config, KeyValueStore, SyncRegistry};
use std::sync::Arc;

/// Everything one invocation needs: configuration, its store context and
/// the channel registry.
pub struct Session {
    pub config: Config,
    pub store: KeyValueStore,
    pub registry: Arc<SyncRegistry>,
}

impl Session {
    pub fn open() -> Result<Self> {
        let config = Config::load_with_env().context("failed to load configuration")?;
        let store = KeyValueStore::open(&config)
            .with_context(|| format!("failed to open store at {:?}", config.store_dir))?;
        Ok(Self {
            config,
            store,
            registry: Arc::new(SyncRegistry::new()),
        })
    }

    /// Endpoint for the given order, or the configured default one.
    pub fn endpoint<R: EndpointRole>(&self, order: Option<&str>) -> ChatEndpoint<R> {
        let order = order.unwrap_or(&self.config.default_order_id);
        ChatEndpoint::from_config(self.store.attach(), &self.config, order, Arc::clone(&self.registry))
    }
}

/// One-line rendering of a message for terminal output.
pub fn format_message(message: &ChatMessage) -> String {
    let time = message.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    let name = message
        .sender_name
        .as_deref()
        .unwrap_or_else(|| message.sender.default_display_name());
    match message.kind {
        MessageKind::Text => format!("[{}] {}: {}", time, name, message.content),
        MessageKind::Image => format!("[{}] {}: [image] {}", time, name, message.content),
    }
}

/// Turn a send outcome into a printed line or an error.
pub fn report_send(outcome: SendOutcome) -> Result<()> {
    match outcome {
        SendOutcome::Sent(message) => {
            println!("Sent {}", message.id);
            Ok(())
        }
        SendOutcome::Duplicate(id) => {
            println!("Message {} was already sent", id);
            Ok(())
        }
        SendOutcome::Rejected(reason) => anyhow::bail!("message rejected: {}", reason),
        SendOutcome::NotPersisted => anyhow::bail!("the store refused the write"),
    }
}
