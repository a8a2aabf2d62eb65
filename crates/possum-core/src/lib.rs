//! Possum Core
//!
//! Request interception for privacy protection: decides per request whether to
//! let it through, cancel it or strip its cookies, and remembers those
//! decisions across restarts.
//!
//! The host runtime feeds interception events to [`WebRequest`] and messages
//! to [`Possum::send_message`]; popups attach through [`Popup::connect`].

mod config;
mod error;
mod messages;
mod popup;
mod possum;
mod webrequest;

pub use config::Config;
pub use error::CoreError;
pub use messages::{
    Message, MessageQueue, MessageSender, Messenger, Notification, OutboundMessage, Outbox,
    FIRSTPARTY_FINGERPRINTING,
};
pub use popup::{Popup, UrlAction};
pub use possum::Possum;
pub use webrequest::{RequestPhase, WebRequest};

// Re-export core components
pub use possum_policy::{
    Action, ActionKey, ActionMeta, ActionStore, BlockList, Detection, FingerprintDetector,
    Header, Policy, PolicyError, Reason, ReasonRegistry, RequestDetails, ResourceType, Ruling,
    Snapshot, Stage, Verdict, BLOCKLIST, FINGERPRINTING, USER_HOST_DEACTIVATE,
    USER_URL_DEACTIVATE,
};
pub use possum_storage::{Database, StorageError};
pub use possum_tabs::{FrameId, Tab, TabError, TabId, TabManager};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
