use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the pipeline can
/// handle failures consistently (user-facing notice vs log-only).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    /// Bad command arguments; the message is shown to the caller as-is.
    #[error("{0}")]
    Usage(String),

    #[error("command registry error: {0}")]
    Registry(String),
}

impl Error {
    pub fn usage(text: impl Into<String>) -> Self {
        Self::Usage(text.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
