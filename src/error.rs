use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("queue is closed")]
    QueueClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    ParseConfig(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Whether this error means the operation stopped early because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
