//! Read command - mark the counterpart's messages read.

use anyhow::Result;
use ridechat_core::chat::EndpointRole;

use super::Session;

pub async fn execute<R: EndpointRole>(session: &Session, order: Option<String>) -> Result<()> {
    let endpoint = session.endpoint::<R>(order.as_deref());
    let changed = endpoint.mark_all_read();
    println!("Marked {} message(s) read in {}", changed, endpoint.conversation_id());
    Ok(())
}
