use thiserror::Error;

/// Errors raised anywhere in the broker core.
#[derive(Debug, Error)]
pub enum RocketCanError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid address: {0}")]
    AddressError(String),

    #[error("broker is not running")]
    NotRunning,

    #[error("broker is already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no data available")]
    NoData,

    #[error("short read: expected {expected} bytes, got {got}")]
    BadMessage { expected: usize, got: usize },

    #[error("checksum mismatch")]
    ChecksumError,

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RocketCanError>;
