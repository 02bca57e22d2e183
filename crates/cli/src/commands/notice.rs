//! Notice command - post a system notice into the conversation.

use anyhow::Result;
use ridechat_core::chat::EndpointRole;

use super::{report_send, Session};

pub async fn execute<R: EndpointRole>(session: &Session, order: Option<String>, text: &str) -> Result<()> {
    let endpoint = session.endpoint::<R>(order.as_deref());
    report_send(endpoint.post_system_notice(text))
}
