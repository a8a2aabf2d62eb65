//! Fingerprinting detection
//!
//! Content scripts report scripts that fingerprint. A third-party report
//! records a `FINGERPRINTING` action so the next request for that URL is
//! cancelled; the request that already ran is left alone. Scripts served from
//! the page's own origin are only recorded.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use possum_tabs::TabId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::action::{Action, ActionKey, ActionMeta};
use crate::blocklist::same_origin;
use crate::error::PolicyError;
use crate::reasons::FINGERPRINTING;
use crate::store::ActionStore;
use crate::Result;

/// Bound on remembered reports; the oldest record is dropped past it
const MAX_RECORDS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintRecord {
    /// Reports received for this URL
    pub reports: u32,
    /// Last report came from a page on the script's own origin
    pub first_party: bool,
    pub first_reported_at: DateTime<Utc>,
}

/// Outcome of a single report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Same origin as the top-level document; never blocked
    FirstParty,
    /// Newly recorded; the next request for the URL is cancelled
    Escalated,
    /// A `FINGERPRINTING` action was already in force
    AlreadyBlocked,
}

pub struct FingerprintDetector {
    records: Arc<RwLock<HashMap<String, FingerprintRecord>>>,
    store: ActionStore,
    max_records: usize,
}

impl FingerprintDetector {
    pub fn new(store: ActionStore) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            store,
            max_records: MAX_RECORDS,
        }
    }

    /// Remember at most `max` reported URLs
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max.max(1);
        self
    }

    /// Handle a report of `url` fingerprinting inside a page whose top-level
    /// document is `top_level`
    pub fn report(&self, url: &str, top_level: Option<&Url>, tab_id: TabId) -> Result<Detection> {
        let parsed = Url::parse(url).map_err(|_| PolicyError::InvalidUrl(url.to_string()))?;
        let first_party = top_level.is_some_and(|page| same_origin(page, &parsed));

        {
            let mut records = self.records.write();
            if records.len() >= self.max_records && !records.contains_key(url) {
                let oldest = records
                    .iter()
                    .min_by_key(|(_, r)| r.first_reported_at)
                    .map(|(u, _)| u.clone());
                if let Some(oldest) = oldest {
                    tracing::debug!(url = %oldest, "Forgetting oldest fingerprinting report");
                    records.remove(&oldest);
                }
            }
            let record = records
                .entry(url.to_string())
                .or_insert_with(|| FingerprintRecord {
                    reports: 0,
                    first_party,
                    first_reported_at: Utc::now(),
                });
            record.reports += 1;
            record.first_party = first_party;
        }

        if first_party {
            tracing::info!(url = %url, tab_id, "First-party fingerprinting reported");
            return Ok(Detection::FirstParty);
        }

        let already = self
            .store
            .get_base(&ActionKey::url(url))
            .is_some_and(|a| a.is(FINGERPRINTING));
        if already {
            return Ok(Detection::AlreadyBlocked);
        }

        self.store.set_url(
            url,
            Action::new(FINGERPRINTING, ActionMeta::href(url).with_tab(tab_id)),
        )?;
        tracing::info!(url = %url, tab_id, "Fingerprinting detected, blocking future requests");

        Ok(Detection::Escalated)
    }

    pub fn record(&self, url: &str) -> Option<FingerprintRecord> {
        self.records.read().get(url).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }
}

impl Clone for FingerprintDetector {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            store: self.store.clone(),
            max_records: self.max_records,
        }
    }
}
