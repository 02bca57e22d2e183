//! Send command - send a text message.

use anyhow::Result;
use ridechat_core::chat::EndpointRole;

use super::{report_send, Session};

pub async fn execute<R: EndpointRole>(
    session: &Session,
    order: Option<String>,
    text: &str,
    id: Option<String>,
) -> Result<()> {
    let endpoint = session.endpoint::<R>(order.as_deref());
    let outcome = match id {
        Some(id) => endpoint.send_text_with_id(id, text),
        None => endpoint.send_text(text),
    };
    report_send(outcome)
}
