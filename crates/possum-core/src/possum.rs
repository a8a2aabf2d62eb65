//! The engine context
//!
//! `Possum` owns the action store, reason registry and tab state, and hands
//! shared handles to the pipeline, the message dispatcher and popups. There is
//! no global state: a host creates one at startup and routes everything
//! through it.

use parking_lot::RwLock;
use possum_policy::{
    Action, ActionKey, ActionMeta, ActionStore, BlockList, Detection, FingerprintDetector,
    Reason, ReasonRegistry, Snapshot, USER_HOST_DEACTIVATE, USER_URL_DEACTIVATE,
};
use possum_storage::Database;
use possum_tabs::{TabId, TabManager};
use std::sync::Arc;

use crate::config::Config;
use crate::error::CoreError;
use crate::messages::{Message, MessageQueue, MessageSender, Messenger, Notification, Outbox};
use crate::webrequest::WebRequest;
use crate::Result;

const BLOCKED_DOMAINS_SETTING: &str = "blocked_domains";

pub struct Possum {
    config: Config,
    db: Option<Database>,
    store: ActionStore,
    registry: Arc<RwLock<ReasonRegistry>>,
    tabs: TabManager,
    detector: FingerprintDetector,
    web_request: WebRequest,
    queue: MessageQueue,
    messenger: Arc<dyn Messenger>,
}

impl Possum {
    /// In-memory engine with default settings
    pub fn new() -> Self {
        Self::assemble(Config::in_memory(), None, ActionStore::new())
    }

    /// Rebuild an in-memory engine from a saved snapshot
    pub fn load(snapshot: &Snapshot) -> Self {
        Self::load_with_config(snapshot, Config::in_memory())
    }

    pub fn load_with_config(snapshot: &Snapshot, config: Config) -> Self {
        let store = ActionStore::load(snapshot);
        tracing::info!(entries = snapshot.len(), "Loaded snapshot");
        Self::assemble(config, None, store)
    }

    /// Open an engine, restoring decisions from the configured database
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let Some(path) = config.database_path.clone() else {
            return Ok(Self::assemble(config, None, ActionStore::new()));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&path)?;
        Self::open_with_database(config, db)
    }

    /// Engine backed by an already opened database
    pub fn open_with_database(mut config: Config, db: Database) -> Result<Self> {
        if let Some(domains) = db.get_setting_json::<Vec<String>>(BLOCKED_DOMAINS_SETTING)? {
            for domain in domains {
                if !config.blocked_domains.contains(&domain) {
                    config.blocked_domains.push(domain);
                }
            }
        }

        let store = ActionStore::with_database(db.clone())?;
        let possum = Self::assemble(config, Some(db), store);

        tracing::info!("Possum initialized");

        Ok(possum)
    }

    fn assemble(config: Config, db: Option<Database>, store: ActionStore) -> Self {
        let registry = Arc::new(RwLock::new(ReasonRegistry::with_defaults(block_list(
            &config,
        ))));
        let tabs = TabManager::new();
        let detector = FingerprintDetector::new(store.clone());
        let web_request = WebRequest::new(
            store.clone(),
            Arc::clone(&registry),
            tabs.clone(),
            config.strip_third_party_cookies,
        );

        Self {
            config,
            db,
            store,
            registry,
            tabs,
            detector,
            web_request,
            queue: MessageQueue::new(),
            messenger: Arc::new(Outbox::new()),
        }
    }

    /// Route outbound notifications through `messenger`
    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn web_request(&self) -> &WebRequest {
        &self.web_request
    }

    pub fn store(&self) -> &ActionStore {
        &self.store
    }

    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    pub fn detector(&self) -> &FingerprintDetector {
        &self.detector
    }

    /// Register a reason after the built-in ones
    pub fn add_reason(&self, reason: Reason) -> Result<()> {
        Ok(self.registry.write().add_reason(reason)?)
    }

    pub fn reason_names(&self) -> Vec<String> {
        self.registry
            .read()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Replace the block list, persisting it when a database is attached
    pub fn set_blocked_domains(&self, domains: Vec<String>) -> Result<()> {
        let config = Config {
            blocked_domains: domains,
            ..self.config.clone()
        };
        config.validate()?;

        if let Some(db) = &self.db {
            db.set_setting_json(BLOCKED_DOMAINS_SETTING, &config.blocked_domains)?;
        }

        tracing::info!(count = config.blocked_domains.len(), "Updated block list");
        self.registry.write().set_block_list(block_list(&config));
        Ok(())
    }

    /// Snapshot of the base decisions
    pub fn save(&self) -> Snapshot {
        self.store.save()
    }

    /// Wait for pending writes to reach the database
    pub fn flush(&self) -> Result<()> {
        Ok(self.store.flush()?)
    }

    pub async fn flush_async(&self) -> Result<()> {
        Ok(self.store.flush_async().await?)
    }

    /// Badge text for a tab: distinct fingerprinting URLs blocked there
    pub fn badge_text(&self, tab_id: TabId) -> String {
        self.tabs.badge_text(tab_id)
    }

    /// Forget a tab, lifting any host deactivation it still held
    pub fn close_tab(&self, tab_id: TabId) {
        let Some(tab) = self.tabs.close_tab(tab_id) else {
            return;
        };

        if let (true, Some(host)) = (tab.host_deactivated, tab.first_party_host()) {
            self.store
                .pop_override_if(&ActionKey::host(host), USER_HOST_DEACTIVATE);
        }
    }

    // === Messages ===

    /// Queue a message for the dispatcher
    pub fn post_message(&self, message: Message, sender: MessageSender) {
        self.queue.post(message, sender);
    }

    /// Queue a message and run the dispatcher
    pub fn send_message(&self, message: Message, sender: MessageSender) -> usize {
        self.post_message(message, sender);
        self.dispatch_pending()
    }

    /// Handle everything queued so far. Failures are logged, never returned.
    pub fn dispatch_pending(&self) -> usize {
        let pending = self.queue.drain();
        let count = pending.len();

        for (message, sender) in pending {
            let kind = message.kind();
            if let Err(e) = self.handle_message(message, sender) {
                tracing::warn!(kind, error = %e, "Dropped message");
            }
        }

        count
    }

    /// Handle one message immediately
    pub fn handle_message(&self, message: Message, sender: MessageSender) -> Result<()> {
        match message {
            Message::Fingerprinting { url } => self.report_fingerprinting(&url, sender),
            Message::UserUrlDeactivate { url, tab_id } => {
                self.store.push_override(
                    ActionKey::url(&url),
                    Action::new(USER_URL_DEACTIVATE, ActionMeta::href(&url).with_tab(tab_id)),
                );
                Ok(())
            }
            Message::UserHostDeactivate { tab_id } => self.toggle_host(tab_id).map(|_| ()),
        }
    }

    fn report_fingerprinting(&self, url: &str, sender: MessageSender) -> Result<()> {
        let tab_id = sender
            .tab_id
            .ok_or(CoreError::MissingSender("FINGERPRINTING"))?;
        let tab = self.tabs.get_tab(tab_id)?;

        let detection = self
            .detector
            .report(url, tab.first_party.as_ref(), tab_id)?;

        if detection == Detection::FirstParty {
            let frame_id = sender.frame_id.unwrap_or(0);
            self.messenger.send_to_frame(
                tab_id,
                frame_id,
                Notification::first_party_fingerprinting(url),
            );
        }

        Ok(())
    }

    /// Flip host deactivation for a tab, returning the new state
    pub fn toggle_host(&self, tab_id: TabId) -> Result<bool> {
        let (deactivated, host) = self.tabs.toggle_host_deactivated(tab_id)?;
        let key = ActionKey::host(&host);

        if deactivated {
            self.store.push_override(
                key,
                Action::new(USER_HOST_DEACTIVATE, ActionMeta::default().with_tab(tab_id)),
            );
        } else {
            self.store.pop_override_if(&key, USER_HOST_DEACTIVATE);
        }

        Ok(deactivated)
    }
}

impl Default for Possum {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Possum {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            db: self.db.clone(),
            store: self.store.clone(),
            registry: Arc::clone(&self.registry),
            tabs: self.tabs.clone(),
            detector: self.detector.clone(),
            web_request: self.web_request.clone(),
            queue: self.queue.clone(),
            messenger: Arc::clone(&self.messenger),
        }
    }
}

fn block_list(config: &Config) -> BlockList {
    let mut list = BlockList::new();
    list.set_blocked_domains(config.blocked_domains.iter().cloned());
    for domain in &config.allow_domains {
        list.allow_domain(domain);
    }
    list
}
