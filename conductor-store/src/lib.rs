//! Durable storage for Conductor's spans, events, trace summaries, and
//! debug sessions.
//!
//! The backing store is a single SQLite file in WAL mode behind a small
//! sqlx pool. Attribute blobs are optionally encrypted at rest with
//! AES-256-GCM; everything needed for indexed queries (identifiers, names,
//! kinds, timestamps, status codes) stays plaintext.

mod encryption;
mod models;
mod retention;
mod store;

pub use encryption::{BlobCipher, EncryptionKey, TRACE_KEY_ENV};
pub use models::{
    system_time, unix_nanos, SessionRecord, StoredEvent, StoredSpan, TraceFilter, TraceSummary,
    RUN_ID_ATTRIBUTE,
};
pub use retention::{spawn_retention, RetentionConfig, RetentionHandle};
pub use store::{SpanStore, StoreConfig};

/// Errors surfaced by the store.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Encryption was required but no key was present.
    #[error("encryption required but {0} is not set")]
    MissingKey(&'static str),

    /// A blob failed to encrypt.
    #[error("failed to encrypt attribute blob")]
    Encrypt,

    /// A blob failed to decrypt, usually a key mismatch.
    #[error("failed to decrypt attribute blob")]
    Decrypt,

    /// A stored value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A stored identifier failed to parse.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}
