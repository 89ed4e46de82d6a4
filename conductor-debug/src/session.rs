use std::collections::{BTreeSet, HashMap, VecDeque};

use conductor_store::SessionRecord;
use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::SessionError;

/// A timestamped event in a session's bounded buffer.
///
/// The SSE layer serializes these verbatim, so the wire shape is fixed
/// here: `{type, timestamp, step_id?, payload?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    /// Event kind (`step.start`, `step.end`, `breakpoint`, `log`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Instant the event occurred, nanoseconds since the unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ns: i64,
    /// Step the event refers to, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Free-form event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl DebugEvent {
    /// An event with just a kind and a timestamp.
    pub fn new(event_type: impl Into<String>, timestamp_ns: i64) -> Self {
        DebugEvent {
            event_type: event_type.into(),
            timestamp_ns,
            step_id: None,
            payload: None,
        }
    }
}

/// An observer registered on a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observer {
    /// Whether this observer may send commands.
    pub is_owner: bool,
    /// Join instant, nanoseconds since the unix epoch.
    pub joined_at_ns: i64,
}

/// The control block of one interactive debug session.
///
/// Serialization skips the observer map: observers are connection-scoped
/// and rebuilt when clients reattach after a restart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugSession {
    /// Unique session id, `{run_id}-{tick}`.
    pub session_id: String,
    /// The run being debugged.
    pub run_id: String,
    /// Step the run is currently executing.
    pub current_step_id: Option<String>,
    /// State-machine state.
    pub state: SessionState,
    /// Step ids execution pauses on.
    pub breakpoints: BTreeSet<String>,
    /// Bounded event history, oldest first.
    pub event_buffer: VecDeque<DebugEvent>,
    /// Last mutation instant.
    pub last_activity_ns: i64,
    /// Creation instant.
    pub created_at_ns: i64,
    /// Hard expiry instant.
    pub expires_at_ns: i64,
    /// Connected observers, keyed by observer id.
    #[serde(skip)]
    pub observers: HashMap<String, Observer>,
}

impl DebugSession {
    /// Append an event, evicting the oldest entries beyond `max_buffer`.
    pub fn push_event(&mut self, event: DebugEvent, max_buffer: usize) {
        self.event_buffer.push_back(event);
        while self.event_buffer.len() > max_buffer {
            self.event_buffer.pop_front();
        }
    }

    /// The observer currently holding ownership, if any.
    pub fn owner(&self) -> Option<&str> {
        self.observers
            .iter()
            .find(|(_, observer)| observer.is_owner)
            .map(|(id, _)| id.as_str())
    }

    /// Convert to the durable row representation.
    pub fn to_record(&self) -> Result<SessionRecord, SessionError> {
        Ok(SessionRecord {
            session_id: self.session_id.clone(),
            run_id: self.run_id.clone(),
            current_step_id: self.current_step_id.clone(),
            state: self.state.as_str().to_owned(),
            breakpoints_json: serde_json::to_string(&self.breakpoints)?,
            event_buffer_json: serde_json::to_string(&self.event_buffer)?,
            last_activity_ns: self.last_activity_ns,
            created_at_ns: self.created_at_ns,
            expires_at_ns: self.expires_at_ns,
        })
    }

    /// Rebuild from a durable row. The observer map starts empty.
    pub fn from_record(record: &SessionRecord) -> Result<Self, SessionError> {
        Ok(DebugSession {
            session_id: record.session_id.clone(),
            run_id: record.run_id.clone(),
            current_step_id: record.current_step_id.clone(),
            state: record
                .state
                .parse()
                .map_err(|err: crate::state::UnknownState| {
                    SessionError::Corrupt(err.to_string())
                })?,
            breakpoints: serde_json::from_str(&record.breakpoints_json)?,
            event_buffer: serde_json::from_str(&record.event_buffer_json)?,
            last_activity_ns: record.last_activity_ns,
            created_at_ns: record.created_at_ns,
            expires_at_ns: record.expires_at_ns,
            observers: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DebugSession {
        DebugSession {
            session_id: "r1-1".into(),
            run_id: "r1".into(),
            current_step_id: Some("s2".into()),
            state: SessionState::Paused,
            breakpoints: BTreeSet::from(["s2".to_owned()]),
            event_buffer: VecDeque::new(),
            last_activity_ns: 5,
            created_at_ns: 1,
            expires_at_ns: 100,
            observers: HashMap::new(),
        }
    }

    #[test]
    fn buffer_evicts_fifo_beyond_cap() {
        let mut session = session();
        for n in 1..=7 {
            session.push_event(DebugEvent::new(format!("e{n}"), n), 5);
        }
        assert_eq!(session.event_buffer.len(), 5);
        let kinds: Vec<_> = session
            .event_buffer
            .iter()
            .map(|e| e.event_type.clone())
            .collect();
        assert_eq!(kinds, vec!["e3", "e4", "e5", "e6", "e7"]);
    }

    #[test]
    fn serde_round_trip_preserves_all_but_observers() {
        let mut original = session();
        original.push_event(DebugEvent::new("step.start", 10), 5);
        original
            .observers
            .insert("o1".into(), Observer { is_owner: true, joined_at_ns: 2 });

        let encoded = serde_json::to_string(&original).unwrap();
        let decoded: DebugSession = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.session_id, original.session_id);
        assert_eq!(decoded.run_id, original.run_id);
        assert_eq!(decoded.current_step_id, original.current_step_id);
        assert_eq!(decoded.state, original.state);
        assert_eq!(decoded.breakpoints, original.breakpoints);
        assert_eq!(decoded.event_buffer, original.event_buffer);
        assert_eq!(decoded.expires_at_ns, original.expires_at_ns);
        assert!(decoded.observers.is_empty());
    }

    #[test]
    fn record_round_trip() {
        let mut original = session();
        original.push_event(DebugEvent::new("breakpoint", 10), 5);
        let record = original.to_record().unwrap();
        let rebuilt = DebugSession::from_record(&record).unwrap();
        assert_eq!(rebuilt.state, original.state);
        assert_eq!(rebuilt.breakpoints, original.breakpoints);
        assert_eq!(rebuilt.event_buffer, original.event_buffer);
    }

    #[test]
    fn owner_lookup() {
        let mut session = session();
        assert_eq!(session.owner(), None);
        session
            .observers
            .insert("o1".into(), Observer { is_owner: false, joined_at_ns: 1 });
        session
            .observers
            .insert("o2".into(), Observer { is_owner: true, joined_at_ns: 2 });
        assert_eq!(session.owner(), Some("o2"));
    }
}
