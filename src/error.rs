use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimberlineError {
    #[error("Unable to load configuration from {path}: {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid queue name: {0:?}")]
    InvalidQueueName(String),

    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout error after {0}ms")]
    Timeout(u64),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl TimberlineError {
    /// Whether the failure came from the store connection rather than from
    /// the data or the caller. Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            TimberlineError::Connection(_) | TimberlineError::Timeout(_) => true,
            #[cfg(feature = "redis")]
            TimberlineError::Redis(err) => {
                err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
            }
            _ => false,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, TimberlineError::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, TimberlineError>;
