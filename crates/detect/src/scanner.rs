//! Configuration scanner.
//!
//! Walks parsed documents depth-first and flags every scalar whose key and
//! value appear in the misconfiguration table for that scalar's kind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use rasp_core::{catch_fault, ConfigValue, NamedDocument, Shutdown};
use rasp_rules::{MisconfigRules, RuleStore};

use crate::error::DetectError;
use crate::finding::{Engine, Finding, Severity};

#[derive(Debug, Clone)]
pub struct ConfigScanner {
    store: Arc<RuleStore<MisconfigRules>>,
}

/// Result of scanning one document.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub source: String,
    pub findings: Vec<Finding>,
    /// Set when the scan of this document faulted; other documents are
    /// unaffected.
    pub fault: Option<String>,
}

impl ConfigScanner {
    pub fn new(store: Arc<RuleStore<MisconfigRules>>) -> Self {
        Self { store }
    }

    /// Scan one document against the current snapshot.
    pub fn scan(&self, document: &ConfigValue) -> Vec<Finding> {
        let rules = self.store.get();
        let mut findings = Vec::new();
        walk_root(&rules, document, &mut findings);
        findings
    }

    /// Scan every document on its own task. Findings are reported to the log
    /// as they are collected. Outstanding scans are aborted on cancellation
    /// and the reports gathered so far are returned.
    pub async fn scan_documents(&self, documents: Vec<NamedDocument>, shutdown: &Shutdown) -> Vec<DocumentReport> {
        let mut tasks = JoinSet::new();
        for document in documents {
            let scanner = self.clone();
            tasks.spawn(async move {
                let NamedDocument { source, root } = document;
                match catch_fault(&source, || scanner.scan(&root)) {
                    Some(findings) => DocumentReport {
                        source,
                        findings,
                        fault: None,
                    },
                    None => DocumentReport {
                        source,
                        findings: Vec::new(),
                        fault: Some("scan panicked".to_string()),
                    },
                }
            });
        }

        let mut reports = Vec::with_capacity(tasks.len());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(pending = tasks.len(), "config scan cancelled");
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(report)) => {
                        for finding in &report.findings {
                            finding.report();
                        }
                        reports.push(report);
                    }
                    Some(Err(e)) => warn!(error = %e, "config scan task failed"),
                    None => break,
                },
            }
        }
        reports
    }
}

fn walk_root(rules: &MisconfigRules, value: &ConfigValue, out: &mut Vec<Finding>) {
    match value {
        ConfigValue::Mapping(entries) => walk_mapping(rules, entries, out),
        // Top-level lists of documents, e.g. multi-entry YAML.
        ConfigValue::Sequence(items) => {
            for item in items {
                walk_root(rules, item, out);
            }
        }
        _ => {}
    }
}

fn walk_mapping(rules: &MisconfigRules, entries: &[(String, ConfigValue)], out: &mut Vec<Finding>) {
    for (key, value) in entries {
        visit(rules, key, value, out);
    }
}

fn visit(rules: &MisconfigRules, key: &str, value: &ConfigValue, out: &mut Vec<Finding>) {
    match value {
        ConfigValue::Mapping(entries) => walk_mapping(rules, entries, out),
        // Elements are compared under the enclosing field's key.
        ConfigValue::Sequence(items) => {
            for item in items {
                visit(rules, key, item, out);
            }
        }
        ConfigValue::Null => {}
        scalar => {
            if is_weak(rules, key, scalar) {
                out.push(Finding::new(
                    Engine::ConfigScan,
                    Severity::Warning,
                    key,
                    format!("{key}={}", Scalar(scalar)),
                ));
            }
        }
    }
}

/// Integers and floats are compared across both numeric tables so that a
/// rule written as `30.0` still matches a document value of `30`.
fn is_weak(rules: &MisconfigRules, key: &str, value: &ConfigValue) -> bool {
    match value {
        ConfigValue::String(s) => rules.string_params.get(key).is_some_and(|rule| rule == s),
        ConfigValue::Bool(b) => rules.bool_params.get(key).is_some_and(|rule| rule == b),
        ConfigValue::Integer(i) => {
            rules.int_params.get(key).is_some_and(|rule| rule == i)
                || rules.float_params.get(key).is_some_and(|rule| *rule == *i as f64)
        }
        ConfigValue::Float(f) => {
            rules.float_params.get(key).is_some_and(|rule| rule == f)
                || (f.fract() == 0.0 && rules.int_params.get(key).is_some_and(|rule| *rule as f64 == *f))
        }
        _ => false,
    }
}

struct Scalar<'a>(&'a ConfigValue);

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            _ => f.write_str("?"),
        }
    }
}

// ── Discovery ─────────────────────────────────────────────────────

/// Documents found under a config directory plus the files that could not
/// be used.
#[derive(Debug, Default)]
pub struct Discovery {
    pub documents: Vec<NamedDocument>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Recursively collect `.json`, `.yaml` and `.yml` documents under `dir`.
/// Hidden entries are ignored; unreadable or malformed files are logged and
/// skipped.
pub fn discover(dir: &Path) -> Result<Discovery, DetectError> {
    if !dir.is_dir() {
        return Err(DetectError::Discovery {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut discovery = Discovery::default();
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "walkdir error, skipping entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let parse: fn(&str) -> rasp_core::Result<ConfigValue> = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ConfigValue::from_json_str,
            Some("yaml" | "yml") => ConfigValue::from_yaml_str,
            _ => continue,
        };

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(root) => discovery
                .documents
                .push(NamedDocument::new(path.display().to_string(), root)),
            Err(reason) => {
                warn!(path = %path.display(), error = %reason, "skipping config file");
                discovery.skipped.push(SkippedFile { path, reason });
            }
        }
    }

    info!(
        dir = %dir.display(),
        documents = discovery.documents.len(),
        skipped = discovery.skipped.len(),
        "config discovery complete"
    );
    Ok(discovery)
}
