//! Store-backed session manager tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use conductor_api::Clock;
use conductor_debug::{
    CommandType, DebugCommand, DebugEvent, SessionError, SessionManager, SessionManagerConfig,
    SessionState,
};
use conductor_store::{SpanStore, StoreConfig};

/// Clock whose reading tests can advance.
#[derive(Debug, Default)]
struct ManualClock {
    offset_secs: AtomicI64,
}

impl ManualClock {
    fn advance(&self, by: Duration) {
        self.offset_secs
            .fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH
            + Duration::from_secs(1_700_000_000)
            + Duration::from_secs(self.offset_secs.load(Ordering::SeqCst).max(0) as u64)
    }
}

async fn store(dir: &tempfile::TempDir) -> SpanStore {
    SpanStore::open_with_key(StoreConfig::new(dir.path().join("sessions.db")), None)
        .await
        .unwrap()
}

fn manager_with_clock(
    store: SpanStore,
    config: SessionManagerConfig,
) -> (Arc<SessionManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let manager = Arc::new(SessionManager::with_clock(store, config, clock.clone()));
    (manager, clock)
}

fn event(n: i64) -> DebugEvent {
    DebugEvent::new(format!("e{n}"), n)
}

#[tokio::test]
async fn session_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionManagerConfig {
        max_event_buffer: 5,
        max_observers: 5,
        ..Default::default()
    };
    let (manager, _clock) = manager_with_clock(store(&dir).await, config);

    let session = manager
        .create_session("r1", ["s2".to_owned()])
        .await
        .unwrap();
    assert_eq!(session.state, SessionState::Initialized);
    assert!(session.breakpoints.contains("s2"));

    manager
        .update_session_state(&session.session_id, SessionState::Running)
        .await
        .unwrap();
    manager
        .update_session_state(&session.session_id, SessionState::Paused)
        .await
        .unwrap();

    for n in 1..=7 {
        manager.add_event(&session.session_id, event(n)).await.unwrap();
    }
    let buffer = manager.get_event_buffer(&session.session_id).await.unwrap();
    assert_eq!(buffer.len(), 5);
    assert_eq!(buffer[0].event_type, "e3");
    assert_eq!(buffer[4].event_type, "e7");

    let owner = manager
        .add_observer(&session.session_id, "o1", true)
        .await
        .unwrap();
    assert!(owner.is_owner);
    manager.add_observer(&session.session_id, "o2", false).await.unwrap();
    manager.add_observer(&session.session_id, "o3", false).await.unwrap();
    assert_eq!(manager.observer_count(&session.session_id).await.unwrap(), 3);

    manager.add_observer(&session.session_id, "o4", false).await.unwrap();
    manager.add_observer(&session.session_id, "o5", false).await.unwrap();
    let err = manager
        .add_observer(&session.session_id, "o6", false)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ObserverLimit(_, 5)));

    assert!(manager.remove_observer(&session.session_id, "o2").await.unwrap());
    assert_eq!(manager.observer_count(&session.session_id).await.unwrap(), 2);
    assert!(manager.is_observer(&session.session_id, "o1").await.unwrap());
    assert!(!manager.is_observer(&session.session_id, "o2").await.unwrap());

    // Paused session accepts commands.
    manager
        .send_command(&session.session_id, DebugCommand::new(CommandType::Continue))
        .await
        .unwrap();
    let mut receiver = manager
        .take_command_receiver(&session.session_id)
        .await
        .unwrap();
    assert_eq!(
        receiver.recv().await.unwrap().command,
        CommandType::Continue
    );
}

#[tokio::test]
async fn only_one_owner_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _clock) = manager_with_clock(store(&dir).await, Default::default());
    let session = manager.create_session("r1", []).await.unwrap();

    let first = manager
        .add_observer(&session.session_id, "o1", true)
        .await
        .unwrap();
    let second = manager
        .add_observer(&session.session_id, "o2", true)
        .await
        .unwrap();
    assert!(first.is_owner);
    assert!(!second.is_owner);
    assert!(manager.is_owner(&session.session_id, "o1").await.unwrap());
    assert!(!manager.is_owner(&session.session_id, "o2").await.unwrap());
}

#[tokio::test]
async fn invalid_transitions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _clock) = manager_with_clock(store(&dir).await, Default::default());
    let session = manager.create_session("r1", []).await.unwrap();

    let err = manager
        .update_session_state(&session.session_id, SessionState::Paused)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));

    manager
        .update_session_state(&session.session_id, SessionState::Running)
        .await
        .unwrap();
    manager
        .update_session_state(&session.session_id, SessionState::Completed)
        .await
        .unwrap();
    let err = manager
        .update_session_state(&session.session_id, SessionState::Running)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
}

#[tokio::test]
async fn reconnection_recovers_from_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let db = store(&dir).await;
    let (manager, _clock) = manager_with_clock(db.clone(), Default::default());

    let session = manager.create_session("r1", ["s2".to_owned()]).await.unwrap();
    manager
        .update_session_state(&session.session_id, SessionState::Running)
        .await
        .unwrap();
    manager
        .update_current_step(&session.session_id, "s3")
        .await
        .unwrap();
    for n in 1..=5 {
        manager.add_event(&session.session_id, event(n)).await.unwrap();
    }

    // A second manager over the same store simulates a restarted daemon.
    let (recovered_manager, _clock) = manager_with_clock(db, Default::default());
    let recovered = recovered_manager
        .get_session(&session.session_id)
        .await
        .unwrap();
    assert_eq!(recovered.state, SessionState::Running);
    assert_eq!(recovered.current_step_id.as_deref(), Some("s3"));
    assert_eq!(recovered.event_buffer.len(), 5);
    assert_eq!(recovered.breakpoints, session.breakpoints);
}

#[tokio::test]
async fn unknown_sessions_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _clock) = manager_with_clock(store(&dir).await, Default::default());
    let err = manager.get_session("missing-1").await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test]
async fn mailbox_rejects_when_full() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _clock) = manager_with_clock(store(&dir).await, Default::default());
    let session = manager.create_session("r1", []).await.unwrap();

    for _ in 0..10 {
        manager
            .send_command(&session.session_id, DebugCommand::new(CommandType::Next))
            .await
            .unwrap();
    }
    let err = manager
        .send_command(&session.session_id, DebugCommand::new(CommandType::Next))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::MailboxFull(_)));
}

#[tokio::test]
async fn events_are_broadcast_to_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _clock) = manager_with_clock(store(&dir).await, Default::default());
    let session = manager.create_session("r1", []).await.unwrap();

    let mut live = manager.subscribe(&session.session_id).await.unwrap();
    manager.add_event(&session.session_id, event(1)).await.unwrap();
    let received = live.recv().await.unwrap();
    assert_eq!(received.event_type, "e1");
}

#[tokio::test]
async fn expired_sessions_are_forced_to_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionManagerConfig {
        session_timeout: Duration::from_secs(60),
        ..Default::default()
    };
    let (manager, clock) = manager_with_clock(store(&dir).await, config);

    let session = manager.create_session("r1", []).await.unwrap();
    manager
        .update_session_state(&session.session_id, SessionState::Running)
        .await
        .unwrap();

    assert_eq!(manager.cleanup_expired_sessions().await, 0);

    clock.advance(Duration::from_secs(120));
    assert_eq!(manager.cleanup_expired_sessions().await, 1);
    assert_eq!(manager.cached_session_count(), 0);

    // Fault-in shows the forced terminal state.
    let recovered = manager.get_session(&session.session_id).await.unwrap();
    assert_eq!(recovered.state, SessionState::Timeout);
}

#[tokio::test]
async fn terminal_sessions_are_purged_after_retention() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionManagerConfig {
        terminal_retention: Duration::from_secs(60 * 60),
        ..Default::default()
    };
    let (manager, clock) = manager_with_clock(store(&dir).await, config);

    let session = manager.create_session("r1", []).await.unwrap();
    manager
        .update_session_state(&session.session_id, SessionState::Running)
        .await
        .unwrap();
    manager
        .update_session_state(&session.session_id, SessionState::Completed)
        .await
        .unwrap();

    assert_eq!(manager.cleanup_completed_sessions().await.unwrap(), 0);

    clock.advance(Duration::from_secs(2 * 60 * 60));
    assert_eq!(manager.cleanup_completed_sessions().await.unwrap(), 1);
    let err = manager.get_session(&session.session_id).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test]
async fn delete_session_removes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _clock) = manager_with_clock(store(&dir).await, Default::default());
    let session = manager.create_session("r1", []).await.unwrap();

    manager.delete_session(&session.session_id).await.unwrap();
    assert!(matches!(
        manager.get_session(&session.session_id).await.unwrap_err(),
        SessionError::NotFound(_)
    ));
}
