//! History command - print the conversation.

use anyhow::Result;
use ridechat_core::chat::EndpointRole;

use super::{format_message, Session};

pub async fn execute<R: EndpointRole>(session: &Session, order: Option<String>, json: bool) -> Result<()> {
    let endpoint = session.endpoint::<R>(order.as_deref());
    let messages = endpoint.history();

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("No messages in {}", endpoint.conversation_id());
        return Ok(());
    }

    for message in &messages {
        let marker = if message.is_incoming_for(endpoint.role()) && !message.read {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, format_message(message));
    }

    Ok(())
}
