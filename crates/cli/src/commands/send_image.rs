//! Send-image command - embed an image file as a data URL and send it.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use ridechat_core::chat::EndpointRole;
use std::path::Path;
use tracing::debug;

use super::{report_send, Session};

/// MIME type for an image file, guessed from its extension.
fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Encode raw bytes as a base64 data URL.
fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub async fn execute<R: EndpointRole>(session: &Session, order: Option<String>, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("image path has no file name")?;

    let payload = data_url(mime_type(path), &bytes);
    debug!("Encoded {} ({} bytes) into {} bytes", file_name, bytes.len(), payload.len());

    let endpoint = session.endpoint::<R>(order.as_deref());
    report_send(endpoint.send_image(&payload, file_name))
}
