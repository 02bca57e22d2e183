//! Core data types for the chat system.
//!
//! These types define the persisted layout shared by every endpoint, so
//! field names follow the stored JSON (`camelCase`) rather than Rust naming.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Current time at the millisecond precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Unique identifier for a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a new random message ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Driver,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Driver => "driver",
            Role::System => "system",
        }
    }

    /// The other party of a ride conversation. System has none.
    pub fn counterpart(&self) -> Option<Role> {
        match self {
            Role::Customer => Some(Role::Driver),
            Role::Driver => Some(Role::Customer),
            Role::System => None,
        }
    }

    /// Name shown when no signed-in identity is available.
    pub fn default_display_name(&self) -> &'static str {
        match self {
            Role::Customer => "Customer",
            Role::Driver => "Driver",
            Role::System => "System",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "driver" => Ok(Role::Driver),
            "system" => Ok(Role::System),
            other => Err(crate::error::Error::Chat(format!("unknown role: {}", other))),
        }
    }
}

/// Kind of message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// Display identity attached to outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            email,
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier, used for deduplication.
    pub id: MessageId,
    /// Author role.
    pub sender: Role,
    /// Body kind.
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Text body, or the file name for images.
    pub content: String,
    /// Embedded image payload (usually a data URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Original file name of an image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    /// Creation time; the ordering key of the log.
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// Set by the recipient once seen.
    #[serde(default)]
    pub read: bool,
}

impl ChatMessage {
    /// Maximum allowed text length (10KB).
    pub const MAX_CONTENT_LENGTH: usize = 10 * 1024;

    /// Maximum allowed image payload (5MB, the usual browser storage quota).
    pub const MAX_IMAGE_PAYLOAD_LENGTH: usize = 5 * 1024 * 1024;

    /// Create a text message stamped now.
    pub fn text(sender: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            kind: MessageKind::Text,
            content: content.into(),
            image_url: None,
            file_name: None,
            sender_name: None,
            sender_email: None,
            timestamp: now(),
            read: false,
        }
    }

    /// Create an image message stamped now. The file name doubles as content.
    pub fn image(sender: Role, payload: impl Into<String>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            kind: MessageKind::Image,
            content: file_name.clone(),
            image_url: Some(payload.into()),
            file_name: Some(file_name),
            ..Self::text(sender, String::new())
        }
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Fill in sender display fields that are still empty.
    pub fn enrich(&mut self, identity: Option<&Identity>) {
        if self.sender_name.is_none() {
            self.sender_name = Some(match identity {
                Some(identity) => identity.name.clone(),
                None => self.sender.default_display_name().to_string(),
            });
        }
        if self.sender_email.is_none() {
            self.sender_email = identity.and_then(|i| i.email.clone());
        }
    }

    /// Whether `reader` should count this message as incoming.
    pub fn is_incoming_for(&self, reader: Role) -> bool {
        self.sender != reader
    }

    /// Short text for conversation listings.
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Text => truncate_preview(&self.content),
            MessageKind::Image => format!("[image] {}", truncate_preview(&self.content)),
        }
    }
}

/// The persisted history of one ride order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// The order this conversation belongs to (the conversation id).
    pub order_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub last_message_time: DateTime<Utc>,
    /// When the history was last cleared.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_millis::option")]
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Create an empty conversation stamped now.
    pub fn new(order_id: impl Into<String>) -> Self {
        let created_at = now();
        Self {
            order_id: order_id.into(),
            messages: Vec::new(),
            created_at,
            last_message_time: created_at,
            cleared_at: None,
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Messages `reader` has not marked read yet.
    pub fn unread_for(&self, reader: Role) -> usize {
        self.messages
            .iter()
            .filter(|m| m.is_incoming_for(reader) && !m.read)
            .count()
    }
}

/// Position of a message in the delivery order: timestamp first, then log
/// position for messages that share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub timestamp: DateTime<Utc>,
    pub position: usize,
}

impl OrderKey {
    pub fn new(timestamp: DateTime<Utc>, position: usize) -> Self {
        Self { timestamp, position }
    }

    /// A key above every message stamped at or before `timestamp`.
    pub fn floor(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            position: usize::MAX,
        }
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.position.cmp(&other.position))
    }
}

/// Truncate content for preview display.
fn truncate_preview(content: &str) -> String {
    const MAX_PREVIEW_LEN: usize = 50;
    if content.chars().count() <= MAX_PREVIEW_LEN {
        content.to_string()
    } else {
        let mut preview: String = content.chars().take(MAX_PREVIEW_LEN - 3).collect();
        preview.push_str("...");
        preview
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix, as browsers write it.
/// Any RFC 3339 timestamp is accepted on read.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(serde::de::Error::custom)
                })
                .transpose()
        }
    }
}
