//! Watch command - print the counterpart's messages as they arrive.

use anyhow::Result;
use ridechat_core::chat::EndpointRole;
use ridechat_core::Listeners;
use tracing::info;

use super::{format_message, Session};

pub async fn execute<R: EndpointRole>(
    session: &Session,
    order: Option<String>,
    mark_read: bool,
) -> Result<()> {
    let mut endpoint = session.endpoint::<R>(order.as_deref());
    // Separate handle for the listener, which runs on the sync task
    let reader = session.endpoint::<R>(order.as_deref());

    println!(
        "Watching {} as {} (Ctrl+C to stop)",
        endpoint.conversation_id(),
        endpoint.role()
    );
    let unread = endpoint.unread_count();
    if unread > 0 {
        println!("{} unread message(s); run `history` to see them", unread);
    }

    let listeners = Listeners::new(move |message| {
        println!("{}", format_message(&message));
        if mark_read {
            reader.mark_all_read();
        }
    })
    .on_history_cleared(|| println!("-- conversation cleared by the other side --"));

    endpoint.init(listeners);

    tokio::signal::ctrl_c().await?;
    endpoint.shutdown();
    info!("Stopped watching {}", endpoint.conversation_id());

    Ok(())
}
