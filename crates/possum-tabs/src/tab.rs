//! Tab data structure
//!
//! A tab's state only lives as long as its current top-level document: every
//! main-frame navigation starts it over.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use url::Url;

use crate::error::TabError;
use crate::Result;

/// Browser-assigned tab identifier
pub type TabId = i64;

/// Browser-assigned frame identifier, `0` is the top-level frame
pub type FrameId = i64;

#[derive(Debug, Clone, Serialize)]
pub struct Tab {
    pub id: TabId,
    /// URL of the current top-level document
    pub first_party: Option<Url>,
    /// User switched protection off for this tab's host
    pub host_deactivated: bool,
    /// Every URL requested since the last navigation, in first-seen order
    pub requested_urls: Vec<String>,
    /// Distinct URLs cancelled for fingerprinting since the last navigation
    pub fingerprinting_blocked: BTreeSet<String>,
    /// When the current document was navigated to
    pub navigated_at: DateTime<Utc>,
}

impl Tab {
    pub fn new(id: TabId) -> Self {
        Self {
            id,
            first_party: None,
            host_deactivated: false,
            requested_urls: Vec::new(),
            fingerprinting_blocked: BTreeSet::new(),
            navigated_at: Utc::now(),
        }
    }

    /// Start over for a new top-level document
    pub fn navigate(&mut self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|_| TabError::InvalidUrl(url.to_string()));

        self.first_party = parsed.as_ref().ok().cloned();
        self.host_deactivated = false;
        self.requested_urls.clear();
        self.fingerprinting_blocked.clear();
        self.navigated_at = Utc::now();

        parsed.map(|_| ())
    }

    pub fn first_party_host(&self) -> Option<&str> {
        self.first_party.as_ref().and_then(|u| u.host_str())
    }

    /// Record a request made from this tab, ignoring repeats
    pub fn record_request(&mut self, url: &str) {
        if !self.requested_urls.iter().any(|u| u == url) {
            self.requested_urls.push(url.to_string());
        }
    }

    /// Flip the host-deactivated flag, returning the new value
    pub fn toggle_host_deactivated(&mut self) -> bool {
        self.host_deactivated = !self.host_deactivated;
        self.host_deactivated
    }

    /// Count a fingerprinting block. Returns `false` if the URL was already counted.
    pub fn record_fingerprinting_block(&mut self, url: &str) -> bool {
        self.fingerprinting_blocked.insert(url.to_string())
    }

    pub fn badge_text(&self) -> String {
        self.fingerprinting_blocked.len().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_resets_state() {
        let mut tab = Tab::new(1);
        tab.navigate("https://first.test/").unwrap();
        tab.record_request("https://third.test/fp.js");
        tab.record_fingerprinting_block("https://third.test/fp.js");
        assert!(tab.toggle_host_deactivated());

        tab.navigate("https://other.test/page").unwrap();

        assert_eq!(tab.first_party_host(), Some("other.test"));
        assert!(!tab.host_deactivated);
        assert!(tab.requested_urls.is_empty());
        assert_eq!(tab.badge_text(), "0");
    }

    #[test]
    fn test_invalid_navigation_clears_first_party() {
        let mut tab = Tab::new(1);
        tab.navigate("https://first.test/").unwrap();

        assert!(tab.navigate("not a url").is_err());
        assert!(tab.first_party.is_none());
    }

    #[test]
    fn test_badge_counts_distinct_urls() {
        let mut tab = Tab::new(3);
        assert!(tab.record_fingerprinting_block("https://t.test/a.js"));
        assert!(!tab.record_fingerprinting_block("https://t.test/a.js"));
        assert!(tab.record_fingerprinting_block("https://t.test/b.js"));
        assert_eq!(tab.badge_text(), "2");
    }

    #[test]
    fn test_requested_urls_keep_first_seen_order() {
        let mut tab = Tab::new(1);
        tab.record_request("https://b.test/");
        tab.record_request("https://a.test/");
        tab.record_request("https://b.test/");
        assert_eq!(tab.requested_urls, vec!["https://b.test/", "https://a.test/"]);
    }
}
