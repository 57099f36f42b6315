//! Detection engines evaluating live observations against the current
//! rule snapshot.
//!
//! - [`egress`]: outbound host / IP / scheme / pattern blacklist checks
//! - [`scanner`]: recursive walk of configuration documents for weak values
//! - [`ports`]: periodic probes for sensitive local listeners

pub mod egress;
pub mod error;
pub mod finding;
pub mod ports;
pub mod scanner;

pub use egress::EgressChecker;
pub use error::DetectError;
pub use finding::{Engine, Finding, Severity};
pub use ports::{PortChecker, PortState};
pub use scanner::{discover, ConfigScanner, Discovery, DocumentReport, SkippedFile};
