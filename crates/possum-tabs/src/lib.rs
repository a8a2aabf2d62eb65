//! Possum Tab State
//!
//! Tracks, per browser tab, the first-party document established by the last
//! main-frame navigation. Everything here is session scoped: it is rebuilt from
//! live navigations and never persisted.

mod error;
mod manager;
mod tab;

pub use error::TabError;
pub use manager::TabManager;
pub use tab::{FrameId, Tab, TabId};

pub type Result<T> = std::result::Result<T, TabError>;
