//! Reasons and the registry that orders them
//!
//! Reasons are evaluated in registration order and the first one that rules
//! wins. Built-in order puts user overrides first, then fingerprinting, then
//! the static block list; reasons added at runtime come after those.

use url::Url;

use crate::action::{Action, ActionKey};
use crate::blocklist::{same_origin, BlockList};
use crate::error::PolicyError;
use crate::request::{RequestDetails, Stage};
use crate::store::ActionStore;
use crate::Result;

pub const USER_URL_DEACTIVATE: &str = "USER_URL_DEACTIVATE";
pub const USER_HOST_DEACTIVATE: &str = "USER_HOST_DEACTIVATE";
pub const FINGERPRINTING: &str = "FINGERPRINTING";
pub const BLOCKLIST: &str = "BLOCKLIST";

/// What a reason decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ruling {
    /// Pass through untouched, stop evaluating
    Allow,
    /// Cancel the request; any headers that still come through lose their cookies
    Cancel,
    /// Let the request through without cookies
    StripCookies,
}

impl Ruling {
    pub fn strips_cookies(&self) -> bool {
        matches!(self, Ruling::Cancel | Ruling::StripCookies)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    Allow,
    Cancel,
    StripCookies,
    /// Cancel unless the request is same-origin with the tab's document
    Fingerprinting,
    /// Computed per request from the list, no recorded action needed
    BlockList(BlockList),
}

impl Policy {
    /// Policies that rule without an action recorded in the store
    pub fn computes_fresh(&self) -> bool {
        matches!(self, Policy::BlockList(_))
    }

    fn rule(&self, ctx: &EvalContext<'_>, url: Option<&Url>) -> Option<Ruling> {
        match self {
            Policy::Allow => Some(Ruling::Allow),
            Policy::Cancel => Some(Ruling::Cancel),
            Policy::StripCookies => Some(Ruling::StripCookies),
            Policy::Fingerprinting => match (ctx.first_party, url) {
                (Some(page), Some(url)) if same_origin(page, url) => None,
                _ => Some(Ruling::Cancel),
            },
            Policy::BlockList(list) => url.filter(|u| list.matches(u)).map(|_| Ruling::Cancel),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reason {
    pub name: String,
    pub policy: Policy,
}

impl Reason {
    pub fn new(name: &str, policy: Policy) -> Self {
        Self {
            name: name.to_string(),
            policy,
        }
    }
}

/// Shared state a reason can consult
pub struct EvalContext<'a> {
    pub store: &'a ActionStore,
    /// Top-level document of the requesting tab
    pub first_party: Option<&'a Url>,
}

/// The ruling and the reason that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub reason: String,
    pub ruling: Ruling,
}

pub struct ReasonRegistry {
    reasons: Vec<Reason>,
}

impl ReasonRegistry {
    pub fn new() -> Self {
        Self {
            reasons: Vec::new(),
        }
    }

    /// Registry with the built-in reasons in their fixed order
    pub fn with_defaults(block_list: BlockList) -> Self {
        let reasons = vec![
            Reason::new(USER_URL_DEACTIVATE, Policy::Allow),
            Reason::new(USER_HOST_DEACTIVATE, Policy::Allow),
            Reason::new(FINGERPRINTING, Policy::Fingerprinting),
            Reason::new(BLOCKLIST, Policy::BlockList(block_list)),
        ];

        Self { reasons }
    }

    pub fn add_reason(&mut self, reason: Reason) -> Result<()> {
        if self.get(&reason.name).is_some() {
            return Err(PolicyError::DuplicateReason(reason.name));
        }

        tracing::info!(reason = %reason.name, position = self.reasons.len(), "Registered reason");
        self.reasons.push(reason);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Reason> {
        self.reasons.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.reasons.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Replace the list used by the built-in block list reason
    pub fn set_block_list(&mut self, list: BlockList) {
        for reason in &mut self.reasons {
            if let Policy::BlockList(current) = &mut reason.policy {
                *current = list;
                return;
            }
        }
    }

    /// Walk the reasons in order until one rules.
    ///
    /// Recorded reasons rule when the effective action for the request URL or
    /// for its host names them. Fresh reasons rule on their own.
    pub fn evaluate(
        &self,
        stage: Stage,
        ctx: &EvalContext<'_>,
        details: &RequestDetails,
    ) -> Option<Evaluation> {
        let url = Url::parse(&details.url).ok();
        let url_action = ctx.store.get_url(&details.url);
        // Host deactivation is scoped to the tab that asked for it; the store
        // only mirrors it for display, so it never rules here
        let host_action = url
            .as_ref()
            .and_then(|u| u.host_str())
            .and_then(|h| ctx.store.get_without(&ActionKey::host(h), USER_HOST_DEACTIVATE));
        let recorded: Vec<&Action> = url_action.iter().chain(host_action.iter()).collect();

        for reason in &self.reasons {
            let applies =
                reason.policy.computes_fresh() || recorded.iter().any(|a| a.is(&reason.name));
            let ruling = if applies {
                reason.policy.rule(ctx, url.as_ref())
            } else {
                None
            };

            if let Some(ruling) = ruling {
                tracing::debug!(
                    stage = stage.as_str(),
                    url = %details.url,
                    reason = %reason.name,
                    ?ruling,
                    "Reason ruled"
                );
                return Some(Evaluation {
                    reason: reason.name.clone(),
                    ruling,
                });
            }
        }

        None
    }
}

impl Default for ReasonRegistry {
    fn default() -> Self {
        Self::with_defaults(BlockList::new())
    }
}
