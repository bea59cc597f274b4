//! Error taxonomy for the listener.
//!
//! Only `ConfigError` is fatal. The others are scoped to one poll cycle
//! (`FetchError`) or one activity (`EncodingError`, `PublishError`) and are
//! logged by the loop instead of being propagated out of it.

use thiserror::Error;

/// Feed source unreachable, slow, or answering with something unusable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("feed answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot decode feed response: {0}")]
    Decode(String),

    #[error("list activities timed out after {0}ms")]
    Timeout(u64),
}

/// The activity could not be turned into its canonical byte form.
#[derive(Debug, Error)]
#[error("cannot canonically encode value: {0}")]
pub struct EncodingError(pub String);

impl From<serde_json::Error> for EncodingError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("sink rejected message: {0}")]
    Rejected(String),

    #[error("publish timed out after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("{name} is not a valid integer: {value:?}")]
    Malformed { name: &'static str, value: String },

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Lifecycle misuse or a failed start.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("listener was already started")]
    AlreadyStarted,

    #[error("listener is not running")]
    NotRunning,

    #[error("poll loop task failed: {0}")]
    Join(String),
}
