//! Unread command - print this side's unread count.

use anyhow::Result;
use ridechat_core::chat::EndpointRole;

use super::Session;

pub async fn execute<R: EndpointRole>(session: &Session, order: Option<String>) -> Result<()> {
    let endpoint = session.endpoint::<R>(order.as_deref());
    println!("{}", endpoint.unread_count());
    Ok(())
}
