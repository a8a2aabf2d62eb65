//! Possum Policy Engine
//!
//! Decides what happens to a request:
//! - Reasons: ordered, named policies that may allow, cancel or strip cookies
//! - Action store: the decision recorded per URL or host, with user overrides
//!   layered on top as a stack
//! - Fingerprinting: promotes third-party scripts reported by content scripts
//!   to blocked
//!
//! Only base decisions are persisted. Overrides live for the session.

mod action;
mod blocklist;
mod error;
mod fingerprinting;
mod persist;
mod reasons;
mod request;
mod store;

pub use action::{Action, ActionKey, ActionMeta};
pub use blocklist::{is_third_party, same_origin, BlockList};
pub use error::PolicyError;
pub use fingerprinting::{Detection, FingerprintDetector, FingerprintRecord};
pub use reasons::{
    EvalContext, Evaluation, Policy, Reason, ReasonRegistry, Ruling, BLOCKLIST, FINGERPRINTING,
    USER_HOST_DEACTIVATE, USER_URL_DEACTIVATE,
};
pub use request::{is_cookie_header, strip_cookies, Header, RequestDetails, ResourceType, Stage, Verdict};
pub use store::{ActionStore, Snapshot};

pub type Result<T> = std::result::Result<T, PolicyError>;
