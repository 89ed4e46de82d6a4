//! Interactive debug sessions for in-flight Conductor runs.
//!
//! Each session is a small state machine with a bounded event buffer, an
//! observer registry (one owner, any number of read-only watchers), and a
//! bounded command mailbox the runner drains. Every mutation is persisted
//! so a restarted daemon recovers sessions on the next lookup, and every
//! appended event is broadcast to SSE subscribers.

mod command;
mod manager;
mod session;
mod state;

pub use command::{CommandType, DebugCommand, UnknownCommand};
pub use manager::{spawn_cleanup, SessionManager, SessionManagerConfig};
pub use session::{DebugEvent, DebugSession, Observer};
pub use state::{SessionState, UnknownState};

/// Errors surfaced by the session manager.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    /// No session with the given id exists in memory or persistence.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The requested transition is not in the state machine.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Rejected target state.
        to: SessionState,
    },

    /// The session already has the maximum number of observers.
    #[error("session {0} already has {1} observers")]
    ObserverLimit(String, usize),

    /// The command mailbox is full.
    #[error("command mailbox full for session {0}")]
    MailboxFull(String),

    /// The command receiver was already taken by the runner.
    #[error("command receiver for session {0} already taken")]
    ReceiverTaken(String),

    /// A persisted session failed to parse.
    #[error("corrupt session row: {0}")]
    Corrupt(String),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] conductor_store::StoreError),

    /// JSON encoding failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
