use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The state machine of an interactive debug session.
///
/// ```text
/// INITIALIZED ──▶ RUNNING ◀──▶ PAUSED
///      │            │             │
///      ▼            ▼             ▼
///    KILLED   COMPLETED / FAILED / TIMEOUT / KILLED
/// ```
///
/// `Completed`, `Failed`, `Timeout`, and `Killed` are terminal. The only
/// path that bypasses this table is expiry cleanup, which forces
/// `Timeout`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created but not yet running.
    Initialized,
    /// The run is executing.
    Running,
    /// The run is suspended awaiting debug commands.
    Paused,
    /// The run finished successfully.
    Completed,
    /// The run finished with an error.
    Failed,
    /// The session expired.
    Timeout,
    /// The session was aborted.
    Killed,
}

impl SessionState {
    /// Stable lowercase name, used in persistence and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initialized => "initialized",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Timeout => "timeout",
            SessionState::Killed => "killed",
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Failed
                | SessionState::Timeout
                | SessionState::Killed
        )
    }

    /// Whether the transition `self -> next` is in the allowed map.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match self {
            Initialized => matches!(next, Running | Killed),
            Running => matches!(next, Paused | Completed | Failed | Timeout | Killed),
            Paused => matches!(next, Running | Completed | Failed | Timeout | Killed),
            Completed | Failed | Timeout | Killed => false,
        }
    }

    /// Every terminal state name, for persistence queries.
    pub fn terminal_names() -> [&'static str; 4] {
        ["completed", "failed", "timeout", "killed"]
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(SessionState::Initialized),
            "running" => Ok(SessionState::Running),
            "paused" => Ok(SessionState::Paused),
            "completed" => Ok(SessionState::Completed),
            "failed" => Ok(SessionState::Failed),
            "timeout" => Ok(SessionState::Timeout),
            "killed" => Ok(SessionState::Killed),
            other => Err(UnknownState(other.to_owned())),
        }
    }
}

/// A state name that is not part of the machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session state: {0:?}")]
pub struct UnknownState(pub String);
