//! YAML seed files: a local snapshot installed before the first sync.
//!
//! ```yaml
//! kind: ssrf_agent
//! hosts: [metadata.google.internal]
//! ips: [169.254.169.254]
//! patterns: ["^10\\."]
//! schemes: [gopher, file]
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Result, RuleError};
use crate::misconfig::MisconfigRules;
use crate::snapshot::RuleSnapshot;
use crate::ssrf::SsrfRuleSpec;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum SeedFile {
    #[serde(rename = "ssrf_agent")]
    Ssrf(SsrfRuleSpec),
    #[serde(rename = "sec_mis_agent")]
    SecMis(MisconfigRules),
}

/// Parse a seed document.
pub fn parse_seed(contents: &str) -> Result<RuleSnapshot> {
    let seed: SeedFile = serde_yaml::from_str(contents)?;
    match seed {
        SeedFile::Ssrf(spec) => Ok(RuleSnapshot::Ssrf(spec.into())),
        SeedFile::SecMis(rules) => {
            if rules.ports.contains(&0) {
                return Err(RuleError::Validation("port 0 is not a valid sensitive port".into()));
            }
            Ok(RuleSnapshot::SecMis(rules))
        }
    }
}

/// Read and parse a seed file from disk.
pub fn load_seed_file(path: &Path) -> Result<RuleSnapshot> {
    let contents = fs::read_to_string(path)?;
    let snapshot = parse_seed(&contents)?;
    info!(path = %path.display(), kind = %snapshot.kind(), "loaded seed rules");
    Ok(snapshot)
}
