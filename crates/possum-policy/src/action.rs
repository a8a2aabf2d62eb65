//! Recorded decisions

use chrono::{DateTime, Utc};
use possum_tabs::TabId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a decision is recorded against
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKey {
    Url(String),
    Host(String),
}

impl ActionKey {
    pub fn url(url: &str) -> Self {
        ActionKey::Url(url.to_string())
    }

    pub fn host(host: &str) -> Self {
        ActionKey::Host(host.to_lowercase())
    }

    /// Key used in snapshots and the `actions` table
    pub fn storage_key(&self) -> String {
        match self {
            ActionKey::Url(url) => format!("url:{}", url),
            ActionKey::Host(host) => format!("host:{}", host),
        }
    }

    pub fn from_storage_key(key: &str) -> Option<Self> {
        match key.split_once(':')? {
            ("url", url) if !url.is_empty() => Some(ActionKey::Url(url.to_string())),
            ("host", host) if !host.is_empty() => Some(ActionKey::host(host)),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    /// Anything else a reason wants to remember
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ActionMeta {
    pub fn href(href: &str) -> Self {
        Self {
            href: Some(href.to_string()),
            ..Self::default()
        }
    }

    pub fn with_tab(mut self, tab_id: TabId) -> Self {
        self.tab_id = Some(tab_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Name of the reason this decision belongs to
    pub reason: String,
    #[serde(default)]
    pub metadata: ActionMeta,
    pub timestamp: DateTime<Utc>,
}

impl Action {
    pub fn new(reason: &str, metadata: ActionMeta) -> Self {
        Self {
            reason: reason.to_string(),
            metadata,
            timestamp: Utc::now(),
        }
    }

    pub fn is(&self, reason: &str) -> bool {
        self.reason == reason
    }
}
