//! Action store
//!
//! Maps URLs and hosts to the decision currently in force. Each key has a base
//! action (set by reasons, persisted) and a stack of user overrides (session
//! only). The effective action is the top of the stack, else the base action.

use parking_lot::RwLock;
use possum_storage::{Database, StoredEntry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::action::{Action, ActionKey};
use crate::persist::Persister;
use crate::Result;

/// Durable form of the base decisions: storage key to JSON-encoded action.
///
/// Values stay encoded so one unreadable entry can be skipped on load without
/// losing the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    fn from_stored(entries: Vec<StoredEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.key, e.value)).collect(),
        }
    }

    fn to_stored(&self) -> Vec<StoredEntry> {
        self.entries
            .iter()
            .map(|(key, value)| StoredEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

#[derive(Default)]
struct StoreState {
    base: HashMap<ActionKey, Action>,
    overrides: HashMap<ActionKey, Vec<Action>>,
}

impl StoreState {
    fn effective(&self, key: &ActionKey) -> Option<Action> {
        self.overrides
            .get(key)
            .and_then(|stack| stack.last())
            .or_else(|| self.base.get(key))
            .cloned()
    }

    /// Effective action once every layer naming `reason` is peeled away
    fn effective_without(&self, key: &ActionKey, reason: &str) -> Option<Action> {
        self.overrides
            .get(key)
            .and_then(|stack| stack.iter().rev().find(|a| !a.is(reason)))
            .or_else(|| self.base.get(key).filter(|a| !a.is(reason)))
            .cloned()
    }
}

pub struct ActionStore {
    state: Arc<RwLock<StoreState>>,
    persister: Option<Persister>,
}

impl ActionStore {
    /// A store that lives only in memory
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            persister: None,
        }
    }

    /// Rebuild a store from a snapshot. Unreadable entries are skipped.
    pub fn load(snapshot: &Snapshot) -> Self {
        let store = Self::new();
        store.restore(snapshot);
        store
    }

    /// Open a store backed by `db`, restoring everything it holds
    pub fn with_database(db: Database) -> Result<Self> {
        let snapshot = Snapshot::from_stored(db.entries()?);
        let persister = Persister::spawn(db)?;

        let store = Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            persister: Some(persister),
        };
        store.restore(&snapshot);

        tracing::info!(entries = snapshot.len(), "Loaded persisted actions");

        Ok(store)
    }

    fn restore(&self, snapshot: &Snapshot) {
        let mut state = self.state.write();

        for (raw_key, raw_value) in &snapshot.entries {
            let Some(key) = ActionKey::from_storage_key(raw_key) else {
                tracing::warn!(key = %raw_key, "Skipping snapshot entry with unknown key");
                continue;
            };

            match serde_json::from_str::<Action>(raw_value) {
                Ok(action) => {
                    state.base.insert(key, action);
                }
                Err(e) => {
                    tracing::warn!(key = %raw_key, error = %e, "Skipping unreadable snapshot entry");
                }
            }
        }
    }

    /// Write a snapshot straight into `db`, replacing what it held
    pub fn save_to(&self, db: &Database) -> Result<()> {
        Ok(db.replace_entries(&self.save().to_stored())?)
    }

    /// Serialize the base decisions. Overrides are not included.
    pub fn save(&self) -> Snapshot {
        let state = self.state.read();
        let mut entries = BTreeMap::new();

        for (key, action) in &state.base {
            match serde_json::to_string(action) {
                Ok(value) => {
                    entries.insert(key.storage_key(), value);
                }
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Failed to encode action");
                }
            }
        }

        Snapshot { entries }
    }

    pub fn set_url(&self, url: &str, action: Action) -> Result<()> {
        self.set(ActionKey::url(url), action)
    }

    pub fn set_host(&self, host: &str, action: Action) -> Result<()> {
        self.set(ActionKey::host(host), action)
    }

    /// Replace the base action for `key`. Override stacks are untouched.
    pub fn set(&self, key: ActionKey, action: Action) -> Result<()> {
        let value = serde_json::to_string(&action)?;
        let mut state = self.state.write();

        tracing::info!(key = %key, reason = %action.reason, "Set action");

        // Queue while still holding the lock so disk order matches memory order
        if let Some(persister) = &self.persister {
            persister.put(key.storage_key(), value);
        }
        state.base.insert(key, action);

        Ok(())
    }

    pub fn unset_url(&self, url: &str) -> Option<Action> {
        self.unset(&ActionKey::url(url))
    }

    pub fn unset_host(&self, host: &str) -> Option<Action> {
        self.unset(&ActionKey::host(host))
    }

    /// Remove the base action for `key`
    pub fn unset(&self, key: &ActionKey) -> Option<Action> {
        let mut state = self.state.write();
        let removed = state.base.remove(key);

        if removed.is_some() {
            tracing::info!(key = %key, "Unset action");
            if let Some(persister) = &self.persister {
                persister.delete(key.storage_key());
            }
        }

        removed
    }

    pub fn get_url(&self, url: &str) -> Option<Action> {
        self.get(&ActionKey::url(url))
    }

    pub fn get_host(&self, host: &str) -> Option<Action> {
        self.get(&ActionKey::host(host))
    }

    /// Effective action for `key`; `None` means no policy applies
    pub fn get(&self, key: &ActionKey) -> Option<Action> {
        self.state.read().effective(key)
    }

    /// Effective action for `key`, looking through any layer recorded for `reason`
    pub fn get_without(&self, key: &ActionKey, reason: &str) -> Option<Action> {
        self.state.read().effective_without(key, reason)
    }

    /// The base action, ignoring overrides
    pub fn get_base(&self, key: &ActionKey) -> Option<Action> {
        self.state.read().base.get(key).cloned()
    }

    pub fn push_override(&self, key: ActionKey, action: Action) {
        let mut state = self.state.write();
        tracing::info!(key = %key, reason = %action.reason, "Pushed override");
        state.overrides.entry(key).or_default().push(action);
    }

    /// Pop the most recent override, restoring whatever was effective before it
    pub fn pop_override(&self, key: &ActionKey) -> Option<Action> {
        let mut state = self.state.write();
        let stack = state.overrides.get_mut(key)?;
        let popped = stack.pop();

        if stack.is_empty() {
            state.overrides.remove(key);
        }

        if let Some(action) = &popped {
            tracing::info!(key = %key, reason = %action.reason, "Popped override");
        }

        popped
    }

    /// Pop the top override only if it belongs to `reason`
    pub fn pop_override_if(&self, key: &ActionKey, reason: &str) -> Option<Action> {
        let mut state = self.state.write();
        let stack = state.overrides.get_mut(key)?;

        if !stack.last().is_some_and(|top| top.is(reason)) {
            return None;
        }

        let popped = stack.pop();
        if stack.is_empty() {
            state.overrides.remove(key);
        }
        tracing::info!(key = %key, reason = %reason, "Popped override");

        popped
    }

    pub fn override_depth(&self, key: &ActionKey) -> usize {
        self.state
            .read()
            .overrides
            .get(key)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Wait for queued writes to reach the database. No-op for in-memory stores.
    pub fn flush(&self) -> Result<()> {
        match &self.persister {
            Some(persister) => persister.flush(),
            None => Ok(()),
        }
    }

    pub async fn flush_async(&self) -> Result<()> {
        match &self.persister {
            Some(persister) => persister.flush_async().await,
            None => Ok(()),
        }
    }
}

impl Default for ActionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ActionStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            persister: self.persister.clone(),
        }
    }
}
