//! Clear command - delete the conversation history for both sides.

use anyhow::Result;
use ridechat_core::chat::EndpointRole;

use super::Session;

pub async fn execute<R: EndpointRole>(session: &Session, order: Option<String>) -> Result<()> {
    let endpoint = session.endpoint::<R>(order.as_deref());
    if !endpoint.delete_history() {
        anyhow::bail!("failed to clear {}", endpoint.conversation_id());
    }
    println!("Cleared {}", endpoint.conversation_id());
    Ok(())
}
