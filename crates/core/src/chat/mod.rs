//! Ride chat between a customer and a driver.
//!
//! Both sides share one persisted log per ride order:
//!
//! - [`types`]: persisted message and conversation layout
//! - [`log`]: append-only, deduplicating conversation log
//! - [`unread`]: per-role unread counters
//! - [`endpoint`]: the customer and driver facades

pub mod endpoint;
pub mod log;
pub mod types;
pub mod unread;

pub use endpoint::{
    ChatEndpoint, CustomerChatEndpoint, CustomerSide, DriverChatEndpoint, DriverSide,
    EndpointRole, RejectReason, SendOutcome,
};
pub use log::{AppendOutcome, MessageLog, CONVERSATIONS_KEY};
pub use types::*;
pub use unread::UnreadCounter;
