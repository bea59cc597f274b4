// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod listen;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::broadcast::{ActivityMessage, PublishSink};
pub use crate::cache::DedupCache;
pub use crate::error::{ConfigError, EncodingError, FetchError, ListenerError, PublishError};
pub use crate::fingerprint::fingerprint;
pub use crate::listen::types::{Activity, ActivitySource};
pub use crate::listen::{ActivityListener, ActivityPoller, ListenerConfig, ListenerState};
