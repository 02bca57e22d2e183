//! Status command - shows store location and conversations.

use anyhow::Result;
use ridechat_core::chat::{MessageLog, Role, UnreadCounter};
use ridechat_core::platform;

use super::Session;

pub async fn execute(session: &Session) -> Result<()> {
    println!("ridechat Status");
    println!("===============");
    println!();

    // Show paths
    println!("Paths:");
    println!("  Config:    {:?}", platform::config_dir());
    println!("  Store:     {:?}", session.config.store_dir);
    println!("  Backend:   {}", session.store.backend_name());
    println!();

    // Show config file status
    let config_file = platform::config_file_path();
    if config_file.exists() {
        println!("Config file: {:?}", config_file);
    } else {
        println!("Config file: Not found (using defaults)");
    }
    println!(
        "Sync:        poll every {:?}, push {}",
        session.config.poll_interval(),
        if session.config.push_enabled { "on" } else { "off" }
    );
    println!();

    let log = MessageLog::new(session.store.clone());
    let conversations = log.conversations();
    if conversations.is_empty() {
        println!("Conversations: none");
        return Ok(());
    }

    let customer_unread = UnreadCounter::new(session.store.clone(), Role::Customer);
    let driver_unread = UnreadCounter::new(session.store.clone(), Role::Driver);

    println!("Conversations:");
    for conversation in &conversations {
        let order = &conversation.order_id;
        println!(
            "  {}  {} message(s), unread customer {} / driver {}",
            order,
            conversation.messages.len(),
            customer_unread.get(order),
            driver_unread.get(order)
        );
        if let Some(last) = conversation.last_message() {
            println!("    last: {}", last.preview());
        }
    }

    Ok(())
}
