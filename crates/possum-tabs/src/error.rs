//! Tab error types

use thiserror::Error;

use crate::tab::TabId;

#[derive(Error, Debug)]
pub enum TabError {
    #[error("Tab not found: {0}")]
    NotFound(TabId),

    #[error("Tab {0} has no first-party document")]
    NoFirstParty(TabId),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
