//! Popup decision surface
//!
//! Shows, for one tab, every URL it requested and the action in force for
//! each. Actions are read from the store on every access, so a detection made
//! after the popup connected is visible without a refresh.

use possum_policy::{Action, ActionKey, ActionMeta, USER_URL_DEACTIVATE};
use possum_tabs::TabId;
use std::collections::BTreeMap;

use crate::possum::Possum;
use crate::Result;

pub struct Popup {
    possum: Possum,
    tab_id: TabId,
    urls: Vec<String>,
}

impl Popup {
    /// Attach to a tab the pipeline has seen
    pub fn connect(possum: &Possum, tab_id: TabId) -> Result<Self> {
        let urls = possum.tabs().requested_urls(tab_id)?;

        tracing::debug!(tab_id, urls = urls.len(), "Popup connected");

        Ok(Self {
            possum: possum.clone(),
            tab_id,
            urls,
        })
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Pick up URLs requested since connecting
    pub fn refresh(&mut self) -> Result<()> {
        self.urls = self.possum.tabs().requested_urls(self.tab_id)?;
        Ok(())
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn url_actions(&self) -> BTreeMap<String, UrlAction<'_>> {
        self.urls
            .iter()
            .map(|url| (url.clone(), UrlAction { popup: self, url: url.clone() }))
            .collect()
    }

    pub fn url_action(&self, url: &str) -> Option<UrlAction<'_>> {
        self.urls.iter().any(|u| u == url).then(|| UrlAction {
            popup: self,
            url: url.to_string(),
        })
    }

    /// Action in force for the tab's own host
    pub fn host_action(&self) -> Option<Action> {
        let tab = self.possum.tabs().get_tab(self.tab_id).ok()?;
        self.possum.store().get_host(tab.first_party_host()?)
    }

    pub fn host_deactivated(&self) -> bool {
        self.possum.tabs().is_host_deactivated(self.tab_id)
    }

    /// Switch protection for the tab's host off or back on
    pub fn toggle_host(&self) -> Result<bool> {
        self.possum.toggle_host(self.tab_id)
    }

    pub fn badge_text(&self) -> String {
        self.possum.badge_text(self.tab_id)
    }
}

/// One row of the popup
pub struct UrlAction<'a> {
    popup: &'a Popup,
    url: String,
}

impl UrlAction<'_> {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Effective action right now
    pub fn action(&self) -> Option<Action> {
        self.popup.possum.store().get_url(&self.url)
    }

    /// Alternate between the automatic decision and a user deactivation,
    /// returning the action now in force
    pub fn handler(&self) -> Option<Action> {
        let store = self.popup.possum.store();
        let key = ActionKey::url(&self.url);

        if store.pop_override_if(&key, USER_URL_DEACTIVATE).is_none() {
            store.push_override(
                key,
                Action::new(
                    USER_URL_DEACTIVATE,
                    ActionMeta::href(&self.url).with_tab(self.popup.tab_id),
                ),
            );
        }

        self.action()
    }
}
