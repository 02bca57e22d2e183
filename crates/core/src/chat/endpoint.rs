//! Role-specific chat endpoints.
//!
//! A [`ChatEndpoint`] is what a customer or driver front end talks to. It
//! writes to the shared log, keeps the counterpart's unread counter up to
//! date and owns this context's sync channel. The two facades differ only
//! in which role they act as:
//!
//! ```ignore
//! let registry = Arc::new(SyncRegistry::new());
//! let mut driver = DriverChatEndpoint::new(store.attach(), "ORD-1", registry);
//! driver.init(Listeners::new(|m| println!("{}: {}", m.sender, m.content)));
//! driver.send_text("Two minutes away");
//! ```

use crate::chat::log::{AppendOutcome, MessageLog, CONVERSATIONS_KEY};
use crate::chat::types::{ChatMessage, Identity, MessageId, Role};
use crate::chat::unread::UnreadCounter;
use crate::config::{Config, DEFAULT_POLL_INTERVAL_MS};
use crate::store::KeyValueStore;
use crate::sync::{
    ChannelKey, ChatSyncChannel, Listeners, Notifier, ReconcileOutcome, SyncHandle, SyncRegistry,
};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Compile-time role of an endpoint.
pub trait EndpointRole: Send + Sync + 'static {
    /// Role written as `sender` on outgoing messages.
    const ROLE: Role;
    /// Role whose unread counter outgoing messages bump.
    const PEER: Role;
}

/// Marker for the customer side.
#[derive(Debug, Clone, Copy)]
pub struct CustomerSide;

/// Marker for the driver side.
#[derive(Debug, Clone, Copy)]
pub struct DriverSide;

impl EndpointRole for CustomerSide {
    const ROLE: Role = Role::Customer;
    const PEER: Role = Role::Driver;
}

impl EndpointRole for DriverSide {
    const ROLE: Role = Role::Driver;
    const PEER: Role = Role::Customer;
}

pub type CustomerChatEndpoint = ChatEndpoint<CustomerSide>;
pub type DriverChatEndpoint = ChatEndpoint<DriverSide>;

/// Why a send was refused before touching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    EmptyContent,
    ContentTooLong { len: usize, max: usize },
    EmptyPayload,
    PayloadTooLarge { len: usize, max: usize },
    EmptyFileName,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyContent => write!(f, "message content cannot be empty"),
            RejectReason::ContentTooLong { len, max } => {
                write!(f, "message content is {} bytes, maximum is {}", len, max)
            }
            RejectReason::EmptyPayload => write!(f, "image payload cannot be empty"),
            RejectReason::PayloadTooLarge { len, max } => {
                write!(f, "image payload is {} bytes, maximum is {}", len, max)
            }
            RejectReason::EmptyFileName => write!(f, "image file name cannot be empty"),
        }
    }
}

/// Result of a send. None of these are errors; they tell the caller
/// whether anything happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Appended to the log.
    Sent(ChatMessage),
    /// A message with this id was already in the log.
    Duplicate(MessageId),
    /// Refused by validation.
    Rejected(RejectReason),
    /// The store refused the write.
    NotPersisted,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }

    /// The stored message, if any.
    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            SendOutcome::Sent(message) => Some(message),
            _ => None,
        }
    }
}

fn validate_text(content: &str) -> Result<(), RejectReason> {
    if content.is_empty() {
        return Err(RejectReason::EmptyContent);
    }
    if content.len() > ChatMessage::MAX_CONTENT_LENGTH {
        return Err(RejectReason::ContentTooLong {
            len: content.len(),
            max: ChatMessage::MAX_CONTENT_LENGTH,
        });
    }
    Ok(())
}

fn validate_image(payload: &str, file_name: &str) -> Result<(), RejectReason> {
    if payload.is_empty() {
        return Err(RejectReason::EmptyPayload);
    }
    if payload.len() > ChatMessage::MAX_IMAGE_PAYLOAD_LENGTH {
        return Err(RejectReason::PayloadTooLarge {
            len: payload.len(),
            max: ChatMessage::MAX_IMAGE_PAYLOAD_LENGTH,
        });
    }
    if file_name.trim().is_empty() {
        return Err(RejectReason::EmptyFileName);
    }
    Ok(())
}

/// Chat facade for one role in one conversation.
pub struct ChatEndpoint<R: EndpointRole> {
    conversation_id: String,
    log: MessageLog,
    own_unread: UnreadCounter,
    peer_unread: UnreadCounter,
    identity: Option<Identity>,
    registry: Arc<SyncRegistry>,
    poll_interval: Duration,
    push_enabled: bool,
    sync: Option<SyncHandle>,
    _role: PhantomData<R>,
}

impl<R: EndpointRole> ChatEndpoint<R> {
    /// Create an endpoint writing through `store`'s context.
    pub fn new(
        store: KeyValueStore,
        conversation_id: impl Into<String>,
        registry: Arc<SyncRegistry>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            own_unread: UnreadCounter::new(store.clone(), R::ROLE),
            peer_unread: UnreadCounter::new(store.clone(), R::PEER),
            log: MessageLog::new(store),
            identity: None,
            registry,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            push_enabled: true,
            sync: None,
            _role: PhantomData,
        }
    }

    /// Create an endpoint using the identity and trigger settings of `config`.
    pub fn from_config(
        store: KeyValueStore,
        config: &Config,
        conversation_id: impl Into<String>,
        registry: Arc<SyncRegistry>,
    ) -> Self {
        Self::new(store, conversation_id, registry)
            .with_identity(config.identity(R::ROLE).cloned())
            .with_poll_interval(config.poll_interval())
            .with_push(config.push_enabled)
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_push(mut self, enabled: bool) -> Self {
        self.push_enabled = enabled;
        self
    }

    pub fn role(&self) -> Role {
        R::ROLE
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn channel_key(&self) -> ChannelKey {
        ChannelKey::new(self.conversation_id.clone(), R::ROLE)
    }

    // ==================== Sync Methods ====================

    /// Start syncing: deliver the counterpart's new messages to `listeners`
    /// on every push notification and poll tick.
    ///
    /// Calling this again replaces the previous channel. Must be called
    /// within a Tokio runtime.
    pub fn init(&mut self, listeners: Listeners) -> &SyncHandle {
        let mut notifier = Notifier::new().with_poll(self.poll_interval);
        if self.push_enabled {
            notifier = notifier.with_push(self.log.store(), [CONVERSATIONS_KEY]);
        }
        self.init_with_notifier(listeners, notifier)
    }

    /// Start syncing driven by a caller-supplied notifier.
    pub fn init_with_notifier(&mut self, listeners: Listeners, notifier: Notifier) -> &SyncHandle {
        let channel = ChatSyncChannel::init(self.log.clone(), self.conversation_id.clone(), R::ROLE);
        info!(
            "{} endpoint syncing {} (poll {:?}, push {})",
            R::ROLE,
            self.conversation_id,
            self.poll_interval,
            self.push_enabled
        );
        self.sync.insert(self.registry.spawn(channel, listeners, notifier))
    }

    /// Register a channel that only advances when [`Self::reconcile`] is called.
    pub fn attach(&mut self, listeners: Listeners) -> &SyncHandle {
        let channel = ChatSyncChannel::init(self.log.clone(), self.conversation_id.clone(), R::ROLE);
        self.sync.insert(self.registry.register(channel, listeners))
    }

    /// Run one reconcile pass now. Idle if the endpoint was never initialised.
    pub fn reconcile(&self) -> ReconcileOutcome {
        match &self.sync {
            Some(handle) => handle.reconcile(),
            None => ReconcileOutcome::Idle,
        }
    }

    /// Stop this endpoint's channel.
    pub fn shutdown(&mut self) {
        if self.sync.take().is_some() {
            self.registry.deactivate(&self.channel_key());
        }
    }

    // ==================== Sending Methods ====================

    /// Send a text message with a fresh id.
    pub fn send_text(&self, content: &str) -> SendOutcome {
        self.send_text_with_id(MessageId::new(), content)
    }

    /// Send a text message with a caller-chosen id. Resending the same id is
    /// reported as [`SendOutcome::Duplicate`] and stores nothing.
    pub fn send_text_with_id(&self, id: impl Into<MessageId>, content: &str) -> SendOutcome {
        let content = content.trim();
        if let Err(reason) = validate_text(content) {
            debug!("Rejected text from {}: {}", R::ROLE, reason);
            return SendOutcome::Rejected(reason);
        }

        let mut message = ChatMessage::text(R::ROLE, content).with_id(id);
        message.enrich(self.identity.as_ref());
        self.submit(message, &[R::PEER])
    }

    /// Send an image. `payload` is stored verbatim (typically a data URL).
    pub fn send_image(&self, payload: &str, file_name: &str) -> SendOutcome {
        if let Err(reason) = validate_image(payload, file_name) {
            debug!("Rejected image from {}: {}", R::ROLE, reason);
            return SendOutcome::Rejected(reason);
        }

        let mut message = ChatMessage::image(R::ROLE, payload, file_name.trim());
        message.enrich(self.identity.as_ref());
        self.submit(message, &[R::PEER])
    }

    /// Post a system notice into the conversation. Both sides see it.
    pub fn post_system_notice(&self, content: &str) -> SendOutcome {
        let content = content.trim();
        if let Err(reason) = validate_text(content) {
            return SendOutcome::Rejected(reason);
        }

        let mut message = ChatMessage::text(Role::System, content);
        message.enrich(None);
        self.submit(message, &[Role::Customer, Role::Driver])
    }

    /// Append and bump the unread counters of `notify`.
    fn submit(&self, message: ChatMessage, notify: &[Role]) -> SendOutcome {
        match self.log.append(&self.conversation_id, message.clone()) {
            AppendOutcome::Inserted => {
                for role in notify {
                    if *role == R::ROLE {
                        self.own_unread.increment(&self.conversation_id);
                    } else {
                        self.peer_unread.increment(&self.conversation_id);
                    }
                }
                debug!("{} sent {} to {}", R::ROLE, message.id, self.conversation_id);
                SendOutcome::Sent(message)
            }
            AppendOutcome::Duplicate => SendOutcome::Duplicate(message.id),
            AppendOutcome::WriteFailed => SendOutcome::NotPersisted,
        }
    }

    // ==================== Read State Methods ====================

    /// Mark every incoming message read and reset this side's counter.
    /// Returns how many messages changed state.
    pub fn mark_all_read(&self) -> usize {
        let changed = self.log.mark_read(&self.conversation_id, R::ROLE);
        self.own_unread.clear(&self.conversation_id);
        changed
    }

    /// Unread messages for this side.
    pub fn unread_count(&self) -> u32 {
        self.own_unread.get(&self.conversation_id)
    }

    // ==================== History Methods ====================

    /// Full history in insertion order.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.log.get_all(&self.conversation_id)
    }

    /// Clear the conversation for both sides.
    ///
    /// Both unread counters are reset and this endpoint's own channel is
    /// told about the clear, so only the counterpart reports it.
    pub fn delete_history(&self) -> bool {
        if !self.log.clear(&self.conversation_id) {
            return false;
        }
        self.own_unread.clear(&self.conversation_id);
        self.peer_unread.clear(&self.conversation_id);

        if let Some(handle) = &self.sync {
            handle.acknowledge_clear();
        }
        info!("{} cleared history of {}", R::ROLE, self.conversation_id);
        true
    }
}

impl<R: EndpointRole> std::fmt::Debug for ChatEndpoint<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEndpoint")
            .field("role", &R::ROLE)
            .field("conversation_id", &self.conversation_id)
            .field("identity", &self.identity)
            .field("syncing", &self.sync.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::MessageKind;
    use crate::store::MemoryBackend;
    use std::sync::Mutex;

    const ORDER: &str = "ORD-1001";

    struct Pair {
        customer: CustomerChatEndpoint,
        driver: DriverChatEndpoint,
    }

    fn pair() -> Pair {
        let store = KeyValueStore::in_memory();
        let registry = Arc::new(SyncRegistry::new());
        Pair {
            customer: CustomerChatEndpoint::new(store.attach(), ORDER, Arc::clone(&registry)),
            driver: DriverChatEndpoint::new(store.attach(), ORDER, registry),
        }
    }

    fn collector() -> (Arc<Mutex<Vec<ChatMessage>>>, Listeners) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        (received, Listeners::new(move |m| sink.lock().unwrap().push(m)))
    }

    #[test]
    fn test_customer_message_reaches_driver() {
        let mut p = pair();
        let (received, listeners) = collector();
        p.driver.attach(listeners);

        let outcome = p.customer.send_text_with_id("m1", "I'm at the north entrance");
        assert!(outcome.is_sent());

        assert_eq!(p.driver.reconcile(), ReconcileOutcome::Delivered(1));
        let received = received.lock().unwrap();
        assert_eq!(received[0].id.as_str(), "m1");
        assert_eq!(received[0].sender, Role::Customer);
        assert_eq!(received[0].sender_name.as_deref(), Some("Customer"));
    }

    #[test]
    fn test_duplicate_send() {
        let p = pair();
        assert!(p.customer.send_text_with_id("dup", "hello").is_sent());
        assert_eq!(
            p.customer.send_text_with_id("dup", "hello"),
            SendOutcome::Duplicate(MessageId::from("dup"))
        );

        assert_eq!(p.customer.history().len(), 1);
        assert_eq!(p.driver.unread_count(), 1);
    }

    #[test]
    fn test_rejected_input_is_noop() {
        let p = pair();
        assert_eq!(p.customer.send_text("   "), SendOutcome::Rejected(RejectReason::EmptyContent));
        assert!(matches!(
            p.customer.send_text(&"x".repeat(ChatMessage::MAX_CONTENT_LENGTH + 1)),
            SendOutcome::Rejected(RejectReason::ContentTooLong { .. })
        ));
        assert_eq!(p.driver.send_image("", "a.png"), SendOutcome::Rejected(RejectReason::EmptyPayload));
        assert_eq!(
            p.driver.send_image("data:image/png;base64,AA", " "),
            SendOutcome::Rejected(RejectReason::EmptyFileName)
        );

        assert!(p.customer.history().is_empty());
        assert_eq!(p.driver.unread_count(), 0);
    }

    #[test]
    fn test_text_is_trimmed() {
        let p = pair();
        let outcome = p.driver.send_text("  Outside now \n");
        assert_eq!(outcome.message().unwrap().content, "Outside now");
    }

    #[test]
    fn test_unread_lifecycle() {
        let p = pair();
        for text in ["one", "two", "three"] {
            p.customer.send_text(text);
        }
        assert_eq!(p.driver.unread_count(), 3);
        assert_eq!(p.customer.unread_count(), 0);

        assert_eq!(p.driver.mark_all_read(), 3);
        assert_eq!(p.driver.unread_count(), 0);
        assert!(p.driver.history().iter().all(|m| m.read));
    }

    #[test]
    fn test_image_message() {
        let mut p = pair();
        let (received, listeners) = collector();
        p.customer.attach(listeners);

        let outcome = p.driver.send_image("data:image/jpeg;base64,/9j/4AAQ", "plate.jpg");
        assert!(outcome.is_sent());
        p.customer.reconcile();

        let received = received.lock().unwrap();
        assert_eq!(received[0].kind, MessageKind::Image);
        assert_eq!(received[0].content, "plate.jpg");
        assert_eq!(received[0].image_url.as_deref(), Some("data:image/jpeg;base64,/9j/4AAQ"));
    }

    #[test]
    fn test_identity_enrichment() {
        let store = KeyValueStore::in_memory();
        let registry = Arc::new(SyncRegistry::new());
        let config = Config {
            driver: Some(Identity::new("Rafael", Some("rafael@drivers.example".to_string()))),
            ..Config::default()
        };
        let driver = DriverChatEndpoint::from_config(store, &config, ORDER, registry);

        let message = driver.send_text("hello").message().cloned().unwrap();
        assert_eq!(message.sender_name.as_deref(), Some("Rafael"));
        assert_eq!(message.sender_email.as_deref(), Some("rafael@drivers.example"));
    }

    #[test]
    fn test_endpoints_never_receive_their_own_messages() {
        let mut p = pair();
        let (driver_seen, listeners) = collector();
        p.driver.attach(listeners);

        p.driver.send_text("from driver");
        p.customer.send_text("from customer");
        p.driver.reconcile();

        let seen = driver_seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|m| m.sender != Role::Driver));
    }

    #[test]
    fn test_system_notice_reaches_both_sides() {
        let mut p = pair();
        let (customer_seen, customer_listeners) = collector();
        let (driver_seen, driver_listeners) = collector();
        p.customer.attach(customer_listeners);
        p.driver.attach(driver_listeners);

        assert!(p.driver.post_system_notice("Driver has arrived").is_sent());
        p.customer.reconcile();
        p.driver.reconcile();

        assert_eq!(customer_seen.lock().unwrap()[0].sender, Role::System);
        assert_eq!(driver_seen.lock().unwrap()[0].sender_name.as_deref(), Some("System"));
        assert_eq!(p.customer.unread_count(), 1);
        assert_eq!(p.driver.unread_count(), 1);
    }

    #[test]
    fn test_delete_history_notifies_counterpart_only() {
        let mut p = pair();
        let cleared = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&cleared);
        p.customer.attach(
            Listeners::new(|_| {}).on_history_cleared(move || sink.lock().unwrap().push("customer")),
        );
        let sink = Arc::clone(&cleared);
        p.driver.attach(
            Listeners::new(|_| {}).on_history_cleared(move || sink.lock().unwrap().push("driver")),
        );

        for i in 0..5 {
            p.customer.send_text(&format!("message {}", i));
        }
        p.customer.reconcile();
        assert_eq!(p.driver.reconcile(), ReconcileOutcome::Delivered(5));

        assert!(p.customer.delete_history());
        assert!(p.customer.history().is_empty());
        assert_eq!(p.driver.unread_count(), 0);

        assert_eq!(p.customer.reconcile(), ReconcileOutcome::Idle);
        assert_eq!(p.driver.reconcile(), ReconcileOutcome::Cleared);
        assert_eq!(p.driver.reconcile(), ReconcileOutcome::Idle);
        assert_eq!(*cleared.lock().unwrap(), vec!["driver"]);
    }

    #[test]
    fn test_storage_failure_degrades_to_not_persisted() {
        let store = KeyValueStore::new(MemoryBackend::with_quota(32));
        let registry = Arc::new(SyncRegistry::new());
        let customer = CustomerChatEndpoint::new(store, ORDER, registry);

        assert_eq!(customer.send_text("hello"), SendOutcome::NotPersisted);
        assert!(customer.history().is_empty());
        assert_eq!(customer.reconcile(), ReconcileOutcome::Idle);
    }

    #[test]
    fn test_reinit_keeps_single_channel() {
        let mut p = pair();
        p.driver.attach(Listeners::new(|_| {}));
        p.driver.attach(Listeners::new(|_| {}));
        p.customer.attach(Listeners::new(|_| {}));
        assert_eq!(p.driver.registry.len(), 2);

        p.driver.shutdown();
        assert_eq!(p.customer.registry.len(), 1);
        assert_eq!(p.driver.reconcile(), ReconcileOutcome::Idle);
    }
}
