use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Document error: {0}")]
    Document(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
