//! Request interception pipeline
//!
//! Each request passes through three stages:
//! ```text
//! Pending
//!   ↓ on_before_request
//! Decided (allow | cancel)
//!   ↓ on_before_send_headers
//! HeadersFiltered
//!   ↓ on_headers_received
//! (done)
//! ```
//! Every stage re-reads shared state, so a decision recorded between stages
//! applies to the next stage of the same request but never rewrites a verdict
//! already returned.

use parking_lot::{Mutex, RwLock};
use possum_policy::{
    is_third_party, strip_cookies, ActionKey, ActionStore, EvalContext, ReasonRegistry,
    RequestDetails, Ruling, Stage, Verdict, FINGERPRINTING, USER_HOST_DEACTIVATE,
};
use possum_tabs::{TabId, TabManager};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Bound on tracked in-flight requests; hosts don't always report completion
const MAX_IN_FLIGHT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Pending,
    Decided { cancelled: bool },
    HeadersFiltered,
}

impl RequestPhase {
    pub fn can_transition_to(&self, target: RequestPhase) -> bool {
        match (self, target) {
            (RequestPhase::Pending, RequestPhase::Decided { .. }) => true,
            (RequestPhase::Decided { cancelled: false }, RequestPhase::HeadersFiltered) => true,
            // Response headers after request headers
            (RequestPhase::HeadersFiltered, RequestPhase::HeadersFiltered) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Decided { cancelled: true })
    }
}

pub struct WebRequest {
    store: ActionStore,
    registry: Arc<RwLock<ReasonRegistry>>,
    tabs: TabManager,
    strip_third_party_cookies: bool,
    in_flight: Arc<Mutex<HashMap<String, RequestPhase>>>,
}

impl WebRequest {
    pub fn new(
        store: ActionStore,
        registry: Arc<RwLock<ReasonRegistry>>,
        tabs: TabManager,
        strip_third_party_cookies: bool,
    ) -> Self {
        Self {
            store,
            registry,
            tabs,
            strip_third_party_cookies,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stage 1: decide whether the request goes out at all
    pub fn on_before_request(&self, details: &RequestDetails) -> Verdict {
        if details.is_main_frame() {
            self.navigate(details.tab_id, &details.url);
        }
        if details.tab_id >= 0 {
            self.tabs.record_request(details.tab_id, &details.url);
        }

        let verdict = match self.rule(Stage::BeforeRequest, details) {
            Some(Ruling::Cancel) => Verdict::Cancel,
            _ => Verdict::NoAction,
        };

        self.advance(
            details,
            RequestPhase::Decided {
                cancelled: verdict == Verdict::Cancel,
            },
        );

        if verdict == Verdict::Cancel {
            tracing::info!(tab_id = details.tab_id, url = %details.url, "Cancelled request");
        }

        verdict
    }

    /// Stage 2: strip cookies from outgoing headers
    pub fn on_before_send_headers(&self, details: &RequestDetails) -> Verdict {
        let verdict = match (&details.request_headers, self.rule(Stage::BeforeSendHeaders, details)) {
            (Some(headers), Some(ruling)) if ruling.strips_cookies() => {
                Verdict::RequestHeaders(strip_cookies(headers))
            }
            _ => Verdict::NoAction,
        };

        self.advance(details, RequestPhase::HeadersFiltered);
        verdict
    }

    /// Stage 3: strip cookies the server tries to set
    pub fn on_headers_received(&self, details: &RequestDetails) -> Verdict {
        let verdict = match (&details.response_headers, self.rule(Stage::HeadersReceived, details)) {
            (Some(headers), Some(ruling)) if ruling.strips_cookies() => {
                Verdict::ResponseHeaders(strip_cookies(headers))
            }
            _ => Verdict::NoAction,
        };

        self.advance(details, RequestPhase::HeadersFiltered);
        self.finish(details.request_id.as_deref());
        verdict
    }

    /// The host reports a request finished or failed
    pub fn finish(&self, request_id: Option<&str>) {
        if let Some(id) = request_id {
            self.in_flight.lock().remove(id);
        }
    }

    pub fn phase(&self, request_id: &str) -> Option<RequestPhase> {
        self.in_flight.lock().get(request_id).copied()
    }

    fn navigate(&self, tab_id: TabId, url: &str) {
        // The host override belongs to the document being left
        if let Ok(tab) = self.tabs.get_tab(tab_id) {
            if let (true, Some(host)) = (tab.host_deactivated, tab.first_party_host()) {
                self.store
                    .pop_override_if(&ActionKey::host(host), USER_HOST_DEACTIVATE);
            }
        }
        self.tabs.navigate(tab_id, url);
    }

    fn rule(&self, stage: Stage, details: &RequestDetails) -> Option<Ruling> {
        if self.tabs.is_host_deactivated(details.tab_id) {
            return None;
        }

        let first_party = self.tabs.first_party(details.tab_id);
        let ctx = EvalContext {
            store: &self.store,
            first_party: first_party.as_ref(),
        };

        let evaluation = self.registry.read().evaluate(stage, &ctx, details);

        match evaluation {
            Some(evaluation) => {
                let counts = stage == Stage::BeforeRequest
                    && details.tab_id >= 0
                    && evaluation.ruling == Ruling::Cancel
                    && evaluation.reason == FINGERPRINTING;
                if counts && self.tabs.record_fingerprinting_block(details.tab_id, &details.url) {
                    tracing::info!(
                        tab_id = details.tab_id,
                        url = %details.url,
                        badge = %self.tabs.badge_text(details.tab_id),
                        "Blocked fingerprinting script"
                    );
                }
                Some(evaluation.ruling)
            }
            None => self.default_ruling(first_party.as_ref(), details),
        }
    }

    /// Nothing ruled: third-party requests go out without cookies
    fn default_ruling(&self, first_party: Option<&Url>, details: &RequestDetails) -> Option<Ruling> {
        if !self.strip_third_party_cookies || details.is_main_frame() {
            return None;
        }

        let page = first_party?;
        let url = Url::parse(&details.url).ok()?;

        is_third_party(page, &url).then_some(Ruling::StripCookies)
    }

    fn advance(&self, details: &RequestDetails, next: RequestPhase) {
        let Some(id) = details.request_id.as_deref() else {
            return;
        };

        let mut in_flight = self.in_flight.lock();
        let current = in_flight.get(id).copied().unwrap_or(RequestPhase::Pending);

        if !current.can_transition_to(next) {
            tracing::warn!(request_id = %id, from = ?current, to = ?next, "Unexpected request phase");
        }

        if next.is_terminal() {
            in_flight.remove(id);
            return;
        }

        if in_flight.len() >= MAX_IN_FLIGHT && !in_flight.contains_key(id) {
            tracing::warn!(tracked = in_flight.len(), "Too many in-flight requests, resetting");
            in_flight.clear();
        }
        in_flight.insert(id.to_string(), next);
    }
}

impl Clone for WebRequest {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: Arc::clone(&self.registry),
            tabs: self.tabs.clone(),
            strip_third_party_cookies: self.strip_third_party_cookies,
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use possum_policy::{Action, ActionMeta, Header, Policy, Reason, ResourceType};

    const PAGE: &str = "https://first.test/";
    const SCRIPT: &str = "https://third.test/script.js";

    fn pipeline(strip_third_party_cookies: bool) -> (WebRequest, ActionStore) {
        let store = ActionStore::new();
        let mut registry = ReasonRegistry::default();
        registry
            .add_reason(Reason::new("block", Policy::Cancel))
            .unwrap();
        let web_request = WebRequest::new(
            store.clone(),
            Arc::new(RwLock::new(registry)),
            TabManager::new(),
            strip_third_party_cookies,
        );
        (web_request, store)
    }

    fn main_frame() -> RequestDetails {
        RequestDetails::new(PAGE, 1, 0, ResourceType::MainFrame)
    }

    fn script() -> RequestDetails {
        RequestDetails::new(SCRIPT, 1, 0, ResourceType::Script)
    }

    fn cookies() -> Vec<Header> {
        vec![Header::new("Cookie", "id=1"), Header::new("Accept", "*/*")]
    }

    #[test]
    fn test_phase_transitions() {
        assert!(RequestPhase::Pending.can_transition_to(RequestPhase::Decided { cancelled: true }));
        assert!(RequestPhase::Decided { cancelled: false }
            .can_transition_to(RequestPhase::HeadersFiltered));
        assert!(!RequestPhase::Decided { cancelled: true }
            .can_transition_to(RequestPhase::HeadersFiltered));
        assert!(!RequestPhase::HeadersFiltered.can_transition_to(RequestPhase::Pending));
    }

    #[test]
    fn test_no_policy_no_action() {
        let (web_request, _) = pipeline(false);
        web_request.on_before_request(&main_frame());

        let request = script().with_request_headers(cookies());
        let response = script().with_response_headers(cookies());
        assert_eq!(web_request.on_before_request(&script()), Verdict::NoAction);
        assert_eq!(web_request.on_before_send_headers(&request), Verdict::NoAction);
        assert_eq!(web_request.on_headers_received(&response), Verdict::NoAction);
    }

    #[test]
    fn test_blocked_request() {
        let (web_request, store) = pipeline(false);
        store
            .set_url(SCRIPT, Action::new("block", ActionMeta::href(SCRIPT)))
            .unwrap();
        web_request.on_before_request(&main_frame());

        assert_eq!(web_request.on_before_request(&script()), Verdict::Cancel);
        assert_eq!(
            web_request.on_before_send_headers(&script().with_request_headers(cookies())),
            Verdict::RequestHeaders(vec![Header::new("Accept", "*/*")])
        );
        // No headers to filter
        assert_eq!(web_request.on_before_send_headers(&script()), Verdict::NoAction);
    }

    #[test]
    fn test_third_party_cookies_stripped_by_default() {
        let (web_request, _) = pipeline(true);
        web_request.on_before_request(&main_frame());

        assert_eq!(web_request.on_before_request(&script()), Verdict::NoAction);
        assert_eq!(
            web_request.on_headers_received(&script().with_response_headers(cookies())),
            Verdict::ResponseHeaders(vec![Header::new("Accept", "*/*")])
        );

        let own = RequestDetails::new("https://cdn.first.test/app.js", 1, 0, ResourceType::Script)
            .with_request_headers(cookies());
        assert_eq!(web_request.on_before_send_headers(&own), Verdict::NoAction);
    }

    #[test]
    fn test_same_site_subdomain_keeps_cookies() {
        let (web_request, _) = pipeline(true);
        web_request.on_before_request(&RequestDetails::new(
            "https://www.example.de/",
            1,
            0,
            ResourceType::MainFrame,
        ));

        let asset = RequestDetails::new("https://static.example.de/app.js", 1, 0, ResourceType::Script)
            .with_request_headers(cookies());
        assert_eq!(web_request.on_before_request(&asset), Verdict::NoAction);
        assert_eq!(web_request.on_before_send_headers(&asset), Verdict::NoAction);
    }

    #[test]
    fn test_host_deactivated_tab_passes_everything() {
        let (web_request, store) = pipeline(true);
        store
            .set_url(SCRIPT, Action::new("block", ActionMeta::href(SCRIPT)))
            .unwrap();
        web_request.on_before_request(&main_frame());
        web_request.tabs.toggle_host_deactivated(1).unwrap();

        assert_eq!(web_request.on_before_request(&script()), Verdict::NoAction);
        assert_eq!(
            web_request.on_before_send_headers(&script().with_request_headers(cookies())),
            Verdict::NoAction
        );

        // Other tabs are unaffected
        let other_tab = RequestDetails::new(SCRIPT, 2, 0, ResourceType::Script);
        assert_eq!(web_request.on_before_request(&other_tab), Verdict::Cancel);
    }

    #[test]
    fn test_background_requests_leave_no_tab() {
        let (web_request, store) = pipeline(false);
        store
            .set_url(SCRIPT, Action::new(FINGERPRINTING, ActionMeta::href(SCRIPT)))
            .unwrap();

        let background = RequestDetails::new(SCRIPT, -1, -1, ResourceType::Script);
        assert_eq!(web_request.on_before_request(&background), Verdict::Cancel);
        assert!(web_request.tabs.get_tab(-1).is_err());
        assert_eq!(web_request.tabs.badge_text(-1), "0");
    }

    #[test]
    fn test_request_phase_tracking() {
        let (web_request, store) = pipeline(false);
        web_request.on_before_request(&main_frame());

        let allowed = script().with_request_id("1");
        web_request.on_before_request(&allowed);
        assert_eq!(
            web_request.phase("1"),
            Some(RequestPhase::Decided { cancelled: false })
        );
        web_request.on_before_send_headers(&allowed);
        assert_eq!(web_request.phase("1"), Some(RequestPhase::HeadersFiltered));
        web_request.on_headers_received(&allowed);
        assert_eq!(web_request.phase("1"), None);

        store
            .set_url(SCRIPT, Action::new("block", ActionMeta::href(SCRIPT)))
            .unwrap();
        let cancelled = script().with_request_id("2");
        assert_eq!(web_request.on_before_request(&cancelled), Verdict::Cancel);
        assert_eq!(web_request.phase("2"), None);
    }
}
