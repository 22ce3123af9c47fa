use thiserror::Error;

/// Errors produced by the storage core and its ambient collaborators.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt segment state: {0}")]
    Corrupt(&'static str),

    #[error("offset {offset} out of range [0, {limit}]")]
    BadOffset { offset: u64, limit: u64 },

    #[error("read limit must be positive")]
    BadLimit,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
