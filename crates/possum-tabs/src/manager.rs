//! Tab Manager
//!
//! Owns the state of every tab seen by the request pipeline. Events for a single
//! tab arrive in order; the lock only guards against tabs racing each other.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::error::TabError;
use crate::tab::{Tab, TabId};
use crate::Result;

pub struct TabManager {
    tabs: Arc<RwLock<HashMap<TabId, Tab>>>,
}

impl TabManager {
    pub fn new() -> Self {
        Self {
            tabs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Main-frame navigation: reset the tab for its new top-level document
    pub fn navigate(&self, tab_id: TabId, url: &str) -> Tab {
        let mut tabs = self.tabs.write();
        let tab = tabs.entry(tab_id).or_insert_with(|| Tab::new(tab_id));

        if let Err(e) = tab.navigate(url) {
            tracing::warn!(tab_id, error = %e, "Navigated to unparsable URL");
        } else {
            tracing::debug!(tab_id, url = %url, "Tab navigated");
        }

        tab.clone()
    }

    /// Get a tab by ID
    pub fn get_tab(&self, tab_id: TabId) -> Result<Tab> {
        self.tabs
            .read()
            .get(&tab_id)
            .cloned()
            .ok_or(TabError::NotFound(tab_id))
    }

    pub fn first_party(&self, tab_id: TabId) -> Option<Url> {
        self.tabs
            .read()
            .get(&tab_id)
            .and_then(|t| t.first_party.clone())
    }

    pub fn is_host_deactivated(&self, tab_id: TabId) -> bool {
        self.tabs
            .read()
            .get(&tab_id)
            .map(|t| t.host_deactivated)
            .unwrap_or(false)
    }

    pub fn record_request(&self, tab_id: TabId, url: &str) {
        self.tabs
            .write()
            .entry(tab_id)
            .or_insert_with(|| Tab::new(tab_id))
            .record_request(url);
    }

    /// Toggle host deactivation, returning the new flag and the tab's host
    pub fn toggle_host_deactivated(&self, tab_id: TabId) -> Result<(bool, String)> {
        let mut tabs = self.tabs.write();
        let tab = tabs.get_mut(&tab_id).ok_or(TabError::NotFound(tab_id))?;
        let host = tab
            .first_party_host()
            .map(str::to_string)
            .ok_or(TabError::NoFirstParty(tab_id))?;

        let deactivated = tab.toggle_host_deactivated();
        tracing::info!(tab_id, host = %host, deactivated, "Toggled host deactivation");

        Ok((deactivated, host))
    }

    /// Count a fingerprinting block for the tab's badge. Unknown tabs are ignored.
    pub fn record_fingerprinting_block(&self, tab_id: TabId, url: &str) -> bool {
        self.tabs
            .write()
            .get_mut(&tab_id)
            .is_some_and(|tab| tab.record_fingerprinting_block(url))
    }

    pub fn badge_text(&self, tab_id: TabId) -> String {
        self.tabs
            .read()
            .get(&tab_id)
            .map(|t| t.badge_text())
            .unwrap_or_else(|| "0".to_string())
    }

    pub fn requested_urls(&self, tab_id: TabId) -> Result<Vec<String>> {
        Ok(self.get_tab(tab_id)?.requested_urls)
    }

    /// Forget a closed tab
    /// Forget a tab, handing back its last state
    pub fn close_tab(&self, tab_id: TabId) -> Option<Tab> {
        let closed = self.tabs.write().remove(&tab_id);
        if closed.is_some() {
            tracing::debug!(tab_id, "Closed tab");
        }
        closed
    }
}

impl Default for TabManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TabManager {
    fn clone(&self) -> Self {
        Self {
            tabs: Arc::clone(&self.tabs),
        }
    }
}
