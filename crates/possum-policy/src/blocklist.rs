//! Static block list and party checks
//!
//! Domain matching covers parent domains: blocking `tracker.test` also blocks
//! `cdn.tracker.test`. The allow list wins over the block list. Party checks
//! compare registrable domains from the Public Suffix List.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::{Host, Url};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockList {
    /// Blocked domains
    blocked_domains: HashSet<String>,
    /// Domains we never block
    allow_domains: HashSet<String>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a domain to block list
    pub fn block_domain(&mut self, domain: &str) {
        self.blocked_domains.insert(domain.to_lowercase());
    }

    pub fn allow_domain(&mut self, domain: &str) {
        self.allow_domains.insert(domain.to_lowercase());
    }

    pub fn set_blocked_domains<I>(&mut self, domains: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.blocked_domains = domains.into_iter().map(|d| d.to_lowercase()).collect();
    }

    pub fn blocked_domain_count(&self) -> usize {
        self.blocked_domains.len()
    }

    pub fn blocked_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.blocked_domains.iter().cloned().collect();
        domains.sort();
        domains
    }

    /// Check if a URL should be blocked
    pub fn matches(&self, url: &Url) -> bool {
        if self.blocked_domains.is_empty() {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let parents = parent_domains(&host);

        // Never block allowlisted domains or their subdomains
        if parents.iter().any(|p| self.allow_domains.contains(p)) {
            return false;
        }

        parents.iter().any(|p| self.blocked_domains.contains(p))
    }
}

/// `a.b.test` -> [`a.b.test`, `b.test`, `test`]
fn parent_domains(host: &str) -> Vec<String> {
    let parts: Vec<&str> = host.split('.').collect();
    (0..parts.len()).map(|i| parts[i..].join(".")).collect()
}

/// Registrable domain (eTLD+1) from the Public Suffix List. IP addresses and
/// bare public suffixes such as `localhost` stand for themselves.
fn site(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            Some(
                psl::domain_str(&domain)
                    .map(str::to_string)
                    .unwrap_or_else(|| domain.clone()),
            )
        }
        other => Some(other.to_string()),
    }
}

/// Whether `request` belongs to a different site than the page
pub fn is_third_party(page: &Url, request: &Url) -> bool {
    site(page) != site(request)
}

/// Same scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_block_domain() {
        let mut list = BlockList::new();
        list.block_domain("Tracker.test");

        assert!(list.matches(&url("https://tracker.test/pixel.gif")));
        assert!(list.matches(&url("https://sub.tracker.test/script.js")));
        assert!(!list.matches(&url("https://example.test/page")));
        assert!(!list.matches(&url("https://nottracker.test/page")));
    }

    #[test]
    fn test_allow_list_wins() {
        let mut list = BlockList::new();
        list.block_domain("tracker.test");
        list.allow_domain("cdn.tracker.test");

        assert!(list.matches(&url("https://ads.tracker.test/a.js")));
        assert!(!list.matches(&url("https://cdn.tracker.test/lib.js")));
        assert!(!list.matches(&url("https://x.cdn.tracker.test/lib.js")));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let list = BlockList::new();
        assert!(!list.matches(&url("https://tracker.test/")));
        assert_eq!(list.blocked_domain_count(), 0);
    }

    #[test]
    fn test_third_party() {
        assert!(is_third_party(
            &url("https://example.com"),
            &url("https://cdn.other.com/script.js")
        ));
        assert!(!is_third_party(
            &url("https://example.com"),
            &url("https://cdn.example.com/script.js")
        ));
        assert!(is_third_party(
            &url("https://shop.example.co.uk"),
            &url("https://other.co.uk/x.js")
        ));
        assert!(!is_third_party(
            &url("http://localhost:8000/"),
            &url("http://localhost:8001/x.js")
        ));
        assert!(is_third_party(
            &url("http://127.0.0.1/"),
            &url("http://127.0.0.2/x.js")
        ));
    }

    #[test]
    fn test_third_party_country_code_domains() {
        // Two-letter TLDs are not automatically second-level suffixes
        assert!(!is_third_party(
            &url("https://www.example.de/"),
            &url("https://static.example.de/app.js")
        ));
        assert!(!is_third_party(
            &url("https://example.io/"),
            &url("https://cdn.example.io/app.js")
        ));
        assert!(is_third_party(
            &url("https://example.de/"),
            &url("https://tracker.de/pixel.gif")
        ));
        assert!(!is_third_party(
            &url("https://www.example.com.au/"),
            &url("https://img.example.com.au/logo.png")
        ));
        assert!(is_third_party(
            &url("https://one.com.au/"),
            &url("https://two.com.au/x.js")
        ));
    }

    #[test]
    fn test_same_origin() {
        assert!(same_origin(
            &url("https://first.test/index.html"),
            &url("https://first.test/fp.js")
        ));
        assert!(!same_origin(
            &url("https://first.test/"),
            &url("https://cdn.first.test/fp.js")
        ));
        assert!(!same_origin(
            &url("https://first.test/"),
            &url("http://first.test/fp.js")
        ));
    }
}
