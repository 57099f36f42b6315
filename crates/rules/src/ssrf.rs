//! SSRF blacklist tables.

use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;

/// A blacklist pattern compiled once when its snapshot is built.
///
/// A pattern that fails to compile is kept with its error so evaluation can
/// report and skip it without touching the remaining patterns.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    regex: std::result::Result<Regex, String>,
}

impl CompiledPattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let regex = Regex::new(&source).map_err(|e| e.to_string());
        Self { source, regex }
    }

    /// The compiled regex, or the compile error message.
    pub fn regex(&self) -> std::result::Result<&Regex, &str> {
        self.regex.as_ref().map_err(|e| e.as_str())
    }
}

/// Outbound-target blacklist: exact IPs, hosts and URL schemes plus an
/// ordered list of patterns.
#[derive(Debug, Clone, Default)]
pub struct SsrfRules {
    ips: HashSet<String>,
    hosts: HashSet<String>,
    schemes: HashSet<String>,
    patterns: Vec<CompiledPattern>,
}

impl SsrfRules {
    pub fn new<I, H, P, S>(ips: I, hosts: H, patterns: P, schemes: S) -> Self
    where
        I: IntoIterator<Item = String>,
        H: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        Self {
            ips: ips.into_iter().collect(),
            hosts: hosts.into_iter().collect(),
            schemes: schemes.into_iter().collect(),
            patterns: patterns.into_iter().map(CompiledPattern::new).collect(),
        }
    }

    pub fn contains_ip(&self, ip: &str) -> bool {
        self.ips.contains(ip)
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    pub fn contains_scheme(&self, scheme: &str) -> bool {
        self.schemes.contains(scheme)
    }

    /// Patterns in the order the authority sent them.
    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.hosts.is_empty() && self.schemes.is_empty() && self.patterns.is_empty()
    }

    /// Total number of entries across all tables.
    pub fn len(&self) -> usize {
        self.ips.len() + self.hosts.len() + self.schemes.len() + self.patterns.len()
    }
}

/// Serialized form used by seed files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SsrfRuleSpec {
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub schemes: Vec<String>,
}

impl From<SsrfRuleSpec> for SsrfRules {
    fn from(spec: SsrfRuleSpec) -> Self {
        SsrfRules::new(spec.ips, spec.hosts, spec.patterns, spec.schemes)
    }
}
