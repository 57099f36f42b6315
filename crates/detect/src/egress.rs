//! Egress target checks (SSRF detection).
//!
//! Every check reads exactly one snapshot from the store and evaluates
//! against it, so a rule update landing mid-check is only seen by the next
//! call.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};
use url::{Host, Url};

use rasp_rules::{RuleStore, SsrfRules};

use crate::finding::{Engine, Finding, Severity};

#[derive(Debug, Clone)]
pub struct EgressChecker {
    store: Arc<RuleStore<SsrfRules>>,
}

impl EgressChecker {
    pub fn new(store: Arc<RuleStore<SsrfRules>>) -> Self {
        Self { store }
    }

    /// Exact match against the blacklisted hosts.
    pub fn check_host(&self, host: &str) -> bool {
        self.store.get().contains_host(host)
    }

    /// Exact match against the blacklisted IPs.
    pub fn check_ip(&self, ip: &str) -> bool {
        self.store.get().contains_ip(ip)
    }

    /// Exact match against the blacklisted URL schemes.
    pub fn check_scheme(&self, scheme: &str) -> bool {
        self.store.get().contains_scheme(scheme)
    }

    /// Evaluate `target` against the blacklist patterns in order, stopping at
    /// the first match. Patterns that failed to compile are logged and
    /// skipped; they never abort the evaluation.
    pub fn check_pattern(&self, target: &str) -> bool {
        let rules = self.store.get();
        matches_pattern(&rules, target).is_some()
    }

    /// Check a full outbound URL: scheme, host, IP literal, then patterns.
    /// Returns the first violation found.
    pub fn check_url(&self, raw: &str) -> Option<Finding> {
        let rules = self.store.get();

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                debug!(url = %raw, error = %e, "unparseable url, falling back to pattern check");
                return matches_pattern(&rules, raw).map(|pattern| pattern_finding(raw, pattern));
            }
        };

        if rules.contains_scheme(url.scheme()) {
            return Some(Finding::new(
                Engine::Egress,
                Severity::Critical,
                raw,
                format!("blacklisted scheme '{}'", url.scheme()),
            ));
        }

        match url.host() {
            Some(Host::Domain(domain)) => {
                if rules.contains_host(domain) {
                    return Some(host_finding(raw, domain));
                }
                // A domain that is really an IP literal the parser kept as text.
                if let Ok(ip) = domain.parse::<IpAddr>() {
                    if rules.contains_ip(&ip.to_string()) {
                        return Some(ip_finding(raw, &ip.to_string()));
                    }
                }
            }
            Some(Host::Ipv4(ip)) => {
                let ip = ip.to_string();
                if rules.contains_ip(&ip) {
                    return Some(ip_finding(raw, &ip));
                }
            }
            Some(Host::Ipv6(ip)) => {
                let ip = ip.to_string();
                if rules.contains_ip(&ip) {
                    return Some(ip_finding(raw, &ip));
                }
            }
            None => {}
        }

        matches_pattern(&rules, raw).map(|pattern| pattern_finding(raw, pattern))
    }

    /// Convenience: run [`check_url`](Self::check_url) and report any finding.
    pub fn inspect(&self, raw: &str) -> Option<Finding> {
        let finding = self.check_url(raw)?;
        finding.report();
        Some(finding)
    }
}

/// First pattern in `rules` that matches `target`.
fn matches_pattern<'a>(rules: &'a SsrfRules, target: &str) -> Option<&'a str> {
    for pattern in rules.patterns() {
        match pattern.regex() {
            Ok(re) => {
                if re.is_match(target) {
                    return Some(pattern.source.as_str());
                }
            }
            Err(e) => {
                warn!(pattern = %pattern.source, error = %e, "skipping invalid blacklist pattern");
            }
        }
    }
    None
}

fn host_finding(raw: &str, host: &str) -> Finding {
    Finding::new(Engine::Egress, Severity::Critical, raw, format!("blacklisted host '{host}'"))
}

fn ip_finding(raw: &str, ip: &str) -> Finding {
    Finding::new(Engine::Egress, Severity::Critical, raw, format!("blacklisted ip '{ip}'"))
}

fn pattern_finding(raw: &str, pattern: &str) -> Finding {
    Finding::new(
        Engine::Egress,
        Severity::Warning,
        raw,
        format!("matches blacklist pattern '{pattern}'"),
    )
}
