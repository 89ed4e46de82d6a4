use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use conductor_api::{Clock, SystemClock};
use conductor_store::{unix_nanos, SpanStore};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::DebugCommand;
use crate::session::{DebugEvent, DebugSession, Observer};
use crate::state::SessionState;
use crate::SessionError;

/// Tunables for the session manager.
#[derive(Clone, Debug)]
pub struct SessionManagerConfig {
    /// Idle lifetime before a session is forced to `Timeout`.
    pub session_timeout: Duration,
    /// Event buffer cap per session; eviction is FIFO.
    pub max_event_buffer: usize,
    /// Maximum concurrent observers per session.
    pub max_observers: usize,
    /// Command mailbox capacity.
    pub mailbox_capacity: usize,
    /// Broadcast fan-out capacity per session.
    pub broadcast_capacity: usize,
    /// How long terminal sessions stay in persistence before
    /// [`SessionManager::cleanup_completed_sessions`] removes them.
    pub terminal_retention: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        SessionManagerConfig {
            session_timeout: Duration::from_secs(30 * 60),
            max_event_buffer: 100,
            max_observers: 5,
            mailbox_capacity: 10,
            broadcast_capacity: 256,
            terminal_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

struct SessionEntry {
    session: Mutex<DebugSession>,
    events: broadcast::Sender<DebugEvent>,
}

struct Mailbox {
    tx: mpsc::Sender<DebugCommand>,
    rx: Mutex<Option<mpsc::Receiver<DebugCommand>>>,
}

/// Owner of every in-flight debug session.
///
/// Sessions live in an in-memory map guarded by a reader/writer lock and
/// are persisted after every mutation; a cache miss faults the session
/// back in from the store, which is how crash recovery happens. Each
/// session carries its own lock for the observer map and buffer, and a
/// broadcast channel that fans appended events out to SSE subscribers.
pub struct SessionManager {
    store: SpanStore,
    config: SessionManagerConfig,
    clock: Arc<dyn Clock>,
    tick: AtomicU64,
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    mailboxes: RwLock<HashMap<String, Arc<Mailbox>>>,
}

impl SessionManager {
    /// Build a manager over the given store.
    pub fn new(store: SpanStore, config: SessionManagerConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Build a manager with an injected clock, for tests.
    pub fn with_clock(
        store: SpanStore,
        config: SessionManagerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        SessionManager {
            store,
            config,
            clock,
            tick: AtomicU64::new(0),
            sessions: RwLock::new(HashMap::new()),
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    /// The manager's configuration.
    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    /// Number of sessions currently cached in memory.
    pub fn cached_session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    fn now_ns(&self) -> i64 {
        unix_nanos(self.clock.now())
    }

    fn ensure_mailbox(&self, session_id: &str) -> Arc<Mailbox> {
        let mut mailboxes = self.mailboxes.write().unwrap();
        mailboxes
            .entry(session_id.to_owned())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);
                Arc::new(Mailbox {
                    tx,
                    rx: Mutex::new(Some(rx)),
                })
            })
            .clone()
    }

    fn insert_entry(&self, session: DebugSession) -> Arc<SessionEntry> {
        let session_id = session.session_id.clone();
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .entry(session_id)
            .or_insert_with(|| {
                let (events, _) = broadcast::channel(self.config.broadcast_capacity);
                Arc::new(SessionEntry {
                    session: Mutex::new(session),
                    events,
                })
            })
            .clone()
    }

    /// Cache lookup, faulting in from persistence on a miss.
    async fn entry(&self, session_id: &str) -> Result<Arc<SessionEntry>, SessionError> {
        if let Some(entry) = self.sessions.read().unwrap().get(session_id) {
            return Ok(entry.clone());
        }
        let record = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_owned()))?;
        let session = DebugSession::from_record(&record)?;
        debug!(session_id, "session faulted in from persistence");
        let entry = self.insert_entry(session);
        self.ensure_mailbox(session_id);
        Ok(entry)
    }

    async fn persist(&self, session: &DebugSession) -> Result<(), SessionError> {
        let record = session.to_record()?;
        self.store.upsert_session(&record).await?;
        Ok(())
    }

    /// Create a new session for a run and persist it.
    pub async fn create_session(
        &self,
        run_id: &str,
        breakpoints: impl IntoIterator<Item = String>,
    ) -> Result<DebugSession, SessionError> {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.now_ns();
        let session = DebugSession {
            session_id: format!("{run_id}-{tick}"),
            run_id: run_id.to_owned(),
            current_step_id: None,
            state: SessionState::Initialized,
            breakpoints: breakpoints.into_iter().collect(),
            event_buffer: Default::default(),
            last_activity_ns: now,
            created_at_ns: now,
            expires_at_ns: now + self.config.session_timeout.as_nanos() as i64,
            observers: HashMap::new(),
        };
        self.persist(&session).await?;
        let snapshot = session.clone();
        self.insert_entry(session);
        self.ensure_mailbox(&snapshot.session_id);
        info!(session_id = %snapshot.session_id, run_id, "debug session created");
        Ok(snapshot)
    }

    /// Fetch a snapshot of a session, loading it from persistence when it
    /// is not cached.
    pub async fn get_session(&self, session_id: &str) -> Result<DebugSession, SessionError> {
        let entry = self.entry(session_id).await?;
        let session = entry.session.lock().unwrap().clone();
        Ok(session)
    }

    /// Apply a state transition, enforcing the state machine.
    pub async fn update_session_state(
        &self,
        session_id: &str,
        new_state: SessionState,
    ) -> Result<(), SessionError> {
        let entry = self.entry(session_id).await?;
        let snapshot = {
            let mut session = entry.session.lock().unwrap();
            if !session.state.can_transition_to(new_state) {
                return Err(SessionError::InvalidTransition {
                    from: session.state,
                    to: new_state,
                });
            }
            session.state = new_state;
            session.last_activity_ns = self.now_ns();
            session.clone()
        };
        self.persist(&snapshot).await
    }

    /// Record the step the run is currently executing.
    pub async fn update_current_step(
        &self,
        session_id: &str,
        step_id: &str,
    ) -> Result<(), SessionError> {
        let entry = self.entry(session_id).await?;
        let snapshot = {
            let mut session = entry.session.lock().unwrap();
            session.current_step_id = Some(step_id.to_owned());
            session.last_activity_ns = self.now_ns();
            session.clone()
        };
        self.persist(&snapshot).await
    }

    /// Append an event to the session's bounded buffer and broadcast it
    /// to subscribers.
    pub async fn add_event(
        &self,
        session_id: &str,
        event: DebugEvent,
    ) -> Result<(), SessionError> {
        let entry = self.entry(session_id).await?;
        let snapshot = {
            let mut session = entry.session.lock().unwrap();
            session.push_event(event.clone(), self.config.max_event_buffer);
            session.last_activity_ns = self.now_ns();
            session.clone()
        };
        self.persist(&snapshot).await?;
        // No subscribers is fine; the buffer is the replay source.
        let _ = entry.events.send(event);
        Ok(())
    }

    /// An immutable copy of the session's event buffer.
    pub async fn get_event_buffer(
        &self,
        session_id: &str,
    ) -> Result<Vec<DebugEvent>, SessionError> {
        let entry = self.entry(session_id).await?;
        let buffer = entry.session.lock().unwrap().event_buffer.iter().cloned().collect();
        Ok(buffer)
    }

    /// Subscribe to live events appended after this call.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<broadcast::Receiver<DebugEvent>, SessionError> {
        let entry = self.entry(session_id).await?;
        Ok(entry.events.subscribe())
    }

    /// Register an observer. The first observer may claim ownership;
    /// later claims are downgraded so exactly one owner exists.
    pub async fn add_observer(
        &self,
        session_id: &str,
        observer_id: &str,
        want_owner: bool,
    ) -> Result<Observer, SessionError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.session.lock().unwrap();
        if !session.observers.contains_key(observer_id)
            && session.observers.len() >= self.config.max_observers
        {
            return Err(SessionError::ObserverLimit(
                session_id.to_owned(),
                self.config.max_observers,
            ));
        }
        let observer = Observer {
            is_owner: want_owner && session.owner().is_none(),
            joined_at_ns: self.now_ns(),
        };
        session.observers.insert(observer_id.to_owned(), observer);
        Ok(observer)
    }

    /// Remove an observer; returns whether it was present.
    pub async fn remove_observer(
        &self,
        session_id: &str,
        observer_id: &str,
    ) -> Result<bool, SessionError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.session.lock().unwrap();
        Ok(session.observers.remove(observer_id).is_some())
    }

    /// Number of registered observers.
    pub async fn observer_count(&self, session_id: &str) -> Result<usize, SessionError> {
        let entry = self.entry(session_id).await?;
        let count = entry.session.lock().unwrap().observers.len();
        Ok(count)
    }

    /// Whether the given observer is registered.
    pub async fn is_observer(
        &self,
        session_id: &str,
        observer_id: &str,
    ) -> Result<bool, SessionError> {
        let entry = self.entry(session_id).await?;
        let present = entry.session.lock().unwrap().observers.contains_key(observer_id);
        Ok(present)
    }

    /// Whether the given observer holds ownership.
    pub async fn is_owner(
        &self,
        session_id: &str,
        observer_id: &str,
    ) -> Result<bool, SessionError> {
        let entry = self.entry(session_id).await?;
        let owns = entry
            .session
            .lock()
            .unwrap()
            .observers
            .get(observer_id)
            .map(|observer| observer.is_owner)
            .unwrap_or(false);
        Ok(owns)
    }

    /// Enqueue a command without blocking.
    pub async fn send_command(
        &self,
        session_id: &str,
        command: DebugCommand,
    ) -> Result<(), SessionError> {
        // Ensure the session exists (and its mailbox with it).
        self.entry(session_id).await?;
        let mailbox = self.ensure_mailbox(session_id);
        match mailbox.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(SessionError::MailboxFull(session_id.to_owned()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SessionError::NotFound(session_id.to_owned()))
            }
        }
    }

    /// Take the receive half of the session's command mailbox. The runner
    /// calls this once per session.
    pub async fn take_command_receiver(
        &self,
        session_id: &str,
    ) -> Result<mpsc::Receiver<DebugCommand>, SessionError> {
        self.entry(session_id).await?;
        let mailbox = self.ensure_mailbox(session_id);
        let receiver = mailbox.rx.lock().unwrap().take();
        receiver.ok_or_else(|| SessionError::ReceiverTaken(session_id.to_owned()))
    }

    /// Force every expired session to `Timeout`, persist it, and drop it
    /// from memory. This is the one path that bypasses the transition
    /// table. Returns the number of sessions cleaned.
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let now = self.now_ns();
        let expired: Vec<(String, Arc<SessionEntry>)> = {
            let sessions = self.sessions.read().unwrap();
            sessions
                .iter()
                .filter(|(_, entry)| {
                    let session = entry.session.lock().unwrap();
                    now > session.expires_at_ns && !session.state.is_terminal()
                })
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect()
        };

        let mut cleaned = 0;
        for (session_id, entry) in expired {
            let snapshot = {
                let mut session = entry.session.lock().unwrap();
                session.state = SessionState::Timeout;
                session.last_activity_ns = now;
                session.clone()
            };
            if let Err(err) = self.persist(&snapshot).await {
                warn!(session_id, error = %err, "failed to persist expired session; will retry");
                continue;
            }
            self.sessions.write().unwrap().remove(&session_id);
            self.mailboxes.write().unwrap().remove(&session_id);
            info!(session_id, "expired debug session timed out");
            cleaned += 1;
        }
        cleaned
    }

    /// Delete terminal sessions older than the configured retention from
    /// persistence and purge them from memory. Returns the number
    /// deleted.
    pub async fn cleanup_completed_sessions(&self) -> Result<usize, SessionError> {
        let cutoff = self.now_ns() - self.config.terminal_retention.as_nanos() as i64;
        let removed = self
            .store
            .delete_sessions_in_states_before(&SessionState::terminal_names(), cutoff)
            .await?;
        if !removed.is_empty() {
            let mut sessions = self.sessions.write().unwrap();
            let mut mailboxes = self.mailboxes.write().unwrap();
            for session_id in &removed {
                sessions.remove(session_id);
                mailboxes.remove(session_id);
            }
        }
        Ok(removed.len())
    }

    /// Remove a session from memory and persistence.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions.write().unwrap().remove(session_id);
        self.mailboxes.write().unwrap().remove(session_id);
        self.store.delete_session(session_id).await?;
        Ok(())
    }
}

/// Spawn the periodic cleanup task: expired sessions every tick,
/// terminal-session retention on the same cadence.
pub fn spawn_cleanup(
    manager: Arc<SessionManager>,
    interval: Duration,
) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {}
            }
            let expired = manager.cleanup_expired_sessions().await;
            if expired > 0 {
                debug!(expired, "expired session sweep finished");
            }
            if let Err(err) = manager.cleanup_completed_sessions().await {
                warn!(error = %err, "terminal session sweep failed");
            }
        }
    });
    cancel
}
