use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("config directory {path} is not readable: {reason}")]
    Discovery { path: PathBuf, reason: String },
}
