use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use conductor_api::{KeyValue, SpanId, SpanKind, Status, TraceId};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::encryption::{BlobCipher, EncryptionKey};
use crate::models::{
    unix_nanos, SessionRecord, StoredEvent, StoredSpan, TraceFilter, TraceSummary,
};
use crate::StoreError;

/// Cap on the legacy linear scan in [`SpanStore::get_trace_by_run_id`].
const RUN_ID_SCAN_LIMIT: i64 = 1000;

const DEFAULT_LIST_LIMIT: i64 = 100;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS spans (
    trace_id        TEXT NOT NULL,
    span_id         TEXT NOT NULL,
    parent_span_id  TEXT,
    name            TEXT NOT NULL,
    kind            TEXT NOT NULL,
    start_time_ns   INTEGER NOT NULL,
    end_time_ns     INTEGER,
    status_code     TEXT NOT NULL,
    status_message  TEXT NOT NULL DEFAULT '',
    attributes      TEXT NOT NULL,
    PRIMARY KEY (trace_id, span_id)
);
CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans(trace_id);
CREATE INDEX IF NOT EXISTS idx_spans_parent ON spans(parent_span_id) WHERE parent_span_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_spans_start ON spans(start_time_ns);
CREATE INDEX IF NOT EXISTS idx_spans_inflight ON spans(trace_id) WHERE end_time_ns IS NULL;

CREATE TABLE IF NOT EXISTS events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id      TEXT NOT NULL,
    span_id       TEXT NOT NULL,
    name          TEXT NOT NULL,
    timestamp_ns  INTEGER NOT NULL,
    attributes    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_span ON events(trace_id, span_id);
CREATE INDEX IF NOT EXISTS idx_events_name ON events(name);
CREATE INDEX IF NOT EXISTS idx_events_time ON events(timestamp_ns);

CREATE TABLE IF NOT EXISTS traces (
    trace_id       TEXT PRIMARY KEY,
    root_span_id   TEXT,
    name           TEXT NOT NULL DEFAULT '',
    run_id         TEXT,
    start_time_ns  INTEGER NOT NULL,
    end_time_ns    INTEGER,
    duration_ns    INTEGER,
    status_code    TEXT NOT NULL DEFAULT 'unset',
    span_count     INTEGER NOT NULL DEFAULT 0,
    error_count    INTEGER NOT NULL DEFAULT 0,
    created_at_ns  INTEGER NOT NULL,
    updated_at_ns  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_traces_status ON traces(status_code);
CREATE INDEX IF NOT EXISTS idx_traces_start ON traces(start_time_ns);
CREATE INDEX IF NOT EXISTS idx_traces_run ON traces(run_id) WHERE run_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS debug_sessions (
    session_id        TEXT PRIMARY KEY,
    run_id            TEXT NOT NULL,
    current_step_id   TEXT,
    state             TEXT NOT NULL,
    breakpoints       TEXT NOT NULL,
    event_buffer      TEXT NOT NULL,
    last_activity_ns  INTEGER NOT NULL,
    created_at_ns     INTEGER NOT NULL,
    expires_at_ns     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_run ON debug_sessions(run_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expires ON debug_sessions(expires_at_ns);
"#;

/// Configuration for opening a [`SpanStore`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Path of the SQLite database file.
    pub path: PathBuf,
    /// Require at-rest encryption. Opening fails when set and no key is
    /// found in the environment.
    pub require_encryption: bool,
    /// Connection pool cap. SQLite in WAL mode supports many readers and
    /// one writer, so this stays small.
    pub max_connections: u32,
}

impl StoreConfig {
    /// Configuration with defaults for the given database path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        StoreConfig {
            path: path.as_ref().to_owned(),
            require_encryption: false,
            max_connections: 5,
        }
    }
}

/// The durable span, trace-summary, and debug-session store.
///
/// Reads run concurrently; SQLite in WAL mode serializes writes. Queries
/// fully drain their result sets before issuing dependent queries so a
/// pooled connection never holds a cursor across a second statement.
/// Callers cancel operations by dropping the returned futures.
#[derive(Clone, Debug)]
pub struct SpanStore {
    pool: SqlitePool,
    cipher: Option<BlobCipher>,
}

impl SpanStore {
    /// Open the store, loading the encryption key from the environment.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let key = EncryptionKey::from_env();
        Self::open_with_key(config, key).await
    }

    /// Open the store with an explicit (or explicitly absent) key.
    pub async fn open_with_key(
        config: StoreConfig,
        key: Option<EncryptionKey>,
    ) -> Result<Self, StoreError> {
        if config.require_encryption && key.is_none() {
            return Err(StoreError::MissingKey(crate::encryption::TRACE_KEY_ENV));
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.clamp(1, 5))
            .connect_with(options)
            .await?;

        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }

        debug!(path = %config.path.display(), encrypted = key.is_some(), "span store opened");
        Ok(SpanStore {
            pool,
            cipher: key.map(|k| BlobCipher::new(&k)),
        })
    }

    /// Whether attribute blobs are encrypted at rest.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// The underlying pool, for maintenance statements in tests and tools.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn seal_attributes(&self, attributes: &[KeyValue]) -> Result<String, StoreError> {
        let json = serde_json::to_string(attributes)?;
        match &self.cipher {
            Some(cipher) => cipher.seal(json.as_bytes()),
            None => Ok(json),
        }
    }

    fn open_attributes(&self, blob: &str) -> Result<Vec<KeyValue>, StoreError> {
        let json = match &self.cipher {
            Some(cipher) => String::from_utf8(cipher.open(blob)?)
                .map_err(|_| StoreError::Decrypt)?,
            None => blob.to_owned(),
        };
        Ok(serde_json::from_str(&json)?)
    }

    /// Upsert a span, replace its events, and refresh the trace summary,
    /// all in one transaction.
    pub async fn store_span(&self, span: &StoredSpan) -> Result<(), StoreError> {
        let attributes = self.seal_attributes(&span.attributes)?;
        let run_id = span.run_id().map(str::to_owned);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO spans (trace_id, span_id, parent_span_id, name, kind,
                               start_time_ns, end_time_ns, status_code, status_message, attributes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trace_id, span_id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                end_time_ns = excluded.end_time_ns,
                status_code = excluded.status_code,
                status_message = excluded.status_message,
                attributes = excluded.attributes
            "#,
        )
        .bind(span.trace_id.to_string())
        .bind(span.span_id.to_string())
        .bind(span.parent_span_id.map(|id| id.to_string()))
        .bind(&span.name)
        .bind(span.kind.as_str())
        .bind(span.start_time_ns)
        .bind(span.end_time_ns)
        .bind(span.status.code())
        .bind(span.status.message())
        .bind(attributes)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM events WHERE trace_id = ? AND span_id = ?")
            .bind(span.trace_id.to_string())
            .bind(span.span_id.to_string())
            .execute(&mut *tx)
            .await?;
        for event in &span.events {
            let event_attributes = self.seal_attributes(&event.attributes)?;
            sqlx::query(
                "INSERT INTO events (trace_id, span_id, name, timestamp_ns, attributes)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(span.trace_id.to_string())
            .bind(span.span_id.to_string())
            .bind(&event.name)
            .bind(event.timestamp_ns)
            .bind(event_attributes)
            .execute(&mut *tx)
            .await?;
        }

        self.refresh_trace_summary(&mut tx, span.trace_id, run_id.as_deref())
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn refresh_trace_summary(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        trace_id: TraceId,
        run_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let trace = trace_id.to_string();
        let aggregate = sqlx::query(
            r#"
            SELECT COUNT(*) AS span_count,
                   MIN(start_time_ns) AS start_time_ns,
                   MAX(end_time_ns) AS end_time_ns,
                   SUM(CASE WHEN end_time_ns IS NULL THEN 1 ELSE 0 END) AS in_flight,
                   SUM(CASE WHEN status_code = 'error' THEN 1 ELSE 0 END) AS error_count
            FROM spans WHERE trace_id = ?
            "#,
        )
        .bind(&trace)
        .fetch_one(&mut **tx)
        .await?;

        let span_count: i64 = aggregate.get("span_count");
        let start_time_ns: i64 = aggregate.try_get("start_time_ns").unwrap_or(0);
        let in_flight: i64 = aggregate.try_get("in_flight").unwrap_or(0);
        let error_count: i64 = aggregate.try_get("error_count").unwrap_or(0);
        let end_time_ns: Option<i64> = if in_flight > 0 {
            None
        } else {
            aggregate.try_get("end_time_ns").ok()
        };
        let duration_ns = end_time_ns.map(|end| end - start_time_ns);

        let root = sqlx::query(
            "SELECT span_id, name, status_code FROM spans
             WHERE trace_id = ? AND parent_span_id IS NULL
             ORDER BY start_time_ns ASC LIMIT 1",
        )
        .bind(&trace)
        .fetch_optional(&mut **tx)
        .await?;
        let (root_span_id, name, status_code) = match root {
            Some(row) => (
                Some(row.get::<String, _>("span_id")),
                row.get::<String, _>("name"),
                row.get::<String, _>("status_code"),
            ),
            None => (None, String::new(), "unset".to_owned()),
        };

        let now = unix_nanos(SystemTime::now());
        sqlx::query(
            r#"
            INSERT INTO traces (trace_id, root_span_id, name, run_id, start_time_ns,
                                end_time_ns, duration_ns, status_code, span_count,
                                error_count, created_at_ns, updated_at_ns)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trace_id) DO UPDATE SET
                root_span_id = excluded.root_span_id,
                name = excluded.name,
                run_id = COALESCE(excluded.run_id, traces.run_id),
                start_time_ns = excluded.start_time_ns,
                end_time_ns = excluded.end_time_ns,
                duration_ns = excluded.duration_ns,
                status_code = excluded.status_code,
                span_count = excluded.span_count,
                error_count = excluded.error_count,
                updated_at_ns = excluded.updated_at_ns
            "#,
        )
        .bind(&trace)
        .bind(root_span_id)
        .bind(name)
        .bind(run_id)
        .bind(start_time_ns)
        .bind(end_time_ns)
        .bind(duration_ns)
        .bind(status_code)
        .bind(span_count)
        .bind(error_count)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Fetch a single span with its events.
    pub async fn get_span(
        &self,
        trace_id: TraceId,
        span_id: SpanId,
    ) -> Result<Option<StoredSpan>, StoreError> {
        let row = sqlx::query("SELECT * FROM spans WHERE trace_id = ? AND span_id = ?")
            .bind(trace_id.to_string())
            .bind(span_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut span = self.span_from_row(&row)?;
        span.events = self.events_for_span(trace_id, span_id).await?;
        Ok(Some(span))
    }

    /// Fetch every span of a trace, ordered by start time ascending.
    ///
    /// The primary rows are drained before the event queries run.
    pub async fn get_trace_spans(&self, trace_id: TraceId) -> Result<Vec<StoredSpan>, StoreError> {
        let rows = sqlx::query("SELECT * FROM spans WHERE trace_id = ? ORDER BY start_time_ns ASC")
            .bind(trace_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        let mut spans = rows
            .iter()
            .map(|row| self.span_from_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        let event_rows = sqlx::query(
            "SELECT span_id, name, timestamp_ns, attributes FROM events
             WHERE trace_id = ? ORDER BY timestamp_ns ASC, id ASC",
        )
        .bind(trace_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let mut by_span: HashMap<String, Vec<StoredEvent>> = HashMap::new();
        for row in &event_rows {
            by_span
                .entry(row.get("span_id"))
                .or_default()
                .push(self.event_from_row(row)?);
        }
        for span in &mut spans {
            if let Some(events) = by_span.remove(&span.span_id.to_string()) {
                span.events = events;
            }
        }
        Ok(spans)
    }

    /// Fetch the summary row for a trace.
    pub async fn get_trace_summary(
        &self,
        trace_id: TraceId,
    ) -> Result<Option<TraceSummary>, StoreError> {
        let row = sqlx::query("SELECT * FROM traces WHERE trace_id = ?")
            .bind(trace_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| summary_from_row(&row)).transpose()
    }

    /// List trace summaries matching the filter, newest first.
    pub async fn list_traces(&self, filter: &TraceFilter) -> Result<Vec<TraceSummary>, StoreError> {
        let limit = if filter.limit > 0 {
            filter.limit
        } else {
            DEFAULT_LIST_LIMIT
        };
        let rows = sqlx::query(
            r#"
            SELECT * FROM traces
            WHERE (?1 IS NULL OR status_code = ?1)
              AND (?2 IS NULL OR start_time_ns >= ?2)
              AND (?3 IS NULL OR start_time_ns <= ?3)
            ORDER BY start_time_ns DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(&filter.status)
        .bind(filter.since_ns)
        .bind(filter.until_ns)
        .bind(limit)
        .bind(filter.offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(summary_from_row).collect()
    }

    /// Find the trace recorded for a workflow run.
    ///
    /// The denormalized `run_id` column answers this with an index lookup.
    /// Rows written before the column existed fall back to a linear scan of
    /// the most recent traces, bounded at 1000, reading root-span attribute
    /// blobs.
    pub async fn get_trace_by_run_id(&self, run_id: &str) -> Result<Option<TraceId>, StoreError> {
        let row = sqlx::query(
            "SELECT trace_id FROM traces WHERE run_id = ? ORDER BY start_time_ns DESC LIMIT 1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Ok(Some(parse_trace_id(&row.get::<String, _>("trace_id"))?));
        }

        let candidates = sqlx::query(
            "SELECT trace_id, root_span_id FROM traces
             WHERE run_id IS NULL AND root_span_id IS NOT NULL
             ORDER BY start_time_ns DESC LIMIT ?",
        )
        .bind(RUN_ID_SCAN_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        for row in candidates {
            let trace_id = parse_trace_id(&row.get::<String, _>("trace_id"))?;
            let span_id = parse_span_id(&row.get::<String, _>("root_span_id"))?;
            if let Some(span) = self.get_span(trace_id, span_id).await? {
                if span.run_id() == Some(run_id) {
                    return Ok(Some(trace_id));
                }
            }
        }
        Ok(None)
    }

    /// Events of a trace across all of its spans, ordered by timestamp
    /// (ties by insertion order), optionally bounded below.
    pub async fn list_trace_events(
        &self,
        trace_id: TraceId,
        since_ns: Option<i64>,
    ) -> Result<Vec<(SpanId, StoredEvent)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT span_id, name, timestamp_ns, attributes FROM events
            WHERE trace_id = ?1 AND (?2 IS NULL OR timestamp_ns >= ?2)
            ORDER BY timestamp_ns ASC, id ASC
            "#,
        )
        .bind(trace_id.to_string())
        .bind(since_ns)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    parse_span_id(&row.get::<String, _>("span_id"))?,
                    self.event_from_row(row)?,
                ))
            })
            .collect()
    }

    /// Delete traces older than the cutoff, cascading to their spans and
    /// events. Returns the number of traces removed.
    pub async fn delete_traces_older_than(&self, cutoff_ns: i64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM events WHERE trace_id IN
             (SELECT trace_id FROM traces WHERE start_time_ns < ?)",
        )
        .bind(cutoff_ns)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM spans WHERE trace_id IN
             (SELECT trace_id FROM traces WHERE start_time_ns < ?)",
        )
        .bind(cutoff_ns)
        .execute(&mut *tx)
        .await?;
        let deleted = sqlx::query("DELETE FROM traces WHERE start_time_ns < ?")
            .bind(cutoff_ns)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted)
    }

    fn span_from_row(&self, row: &SqliteRow) -> Result<StoredSpan, StoreError> {
        let status = match row.get::<String, _>("status_code").as_str() {
            "ok" => Status::Ok,
            "error" => Status::error(row.get::<String, _>("status_message")),
            _ => Status::Unset,
        };
        Ok(StoredSpan {
            trace_id: parse_trace_id(&row.get::<String, _>("trace_id"))?,
            span_id: parse_span_id(&row.get::<String, _>("span_id"))?,
            parent_span_id: row
                .get::<Option<String>, _>("parent_span_id")
                .map(|id| parse_span_id(&id))
                .transpose()?,
            name: row.get("name"),
            kind: SpanKind::from_str_lossy(&row.get::<String, _>("kind")),
            start_time_ns: row.get("start_time_ns"),
            end_time_ns: row.get("end_time_ns"),
            status,
            attributes: self.open_attributes(&row.get::<String, _>("attributes"))?,
            events: Vec::new(),
        })
    }

    fn event_from_row(&self, row: &SqliteRow) -> Result<StoredEvent, StoreError> {
        Ok(StoredEvent {
            name: row.get("name"),
            timestamp_ns: row.get("timestamp_ns"),
            attributes: self.open_attributes(&row.get::<String, _>("attributes"))?,
        })
    }

    async fn events_for_span(
        &self,
        trace_id: TraceId,
        span_id: SpanId,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, timestamp_ns, attributes FROM events
             WHERE trace_id = ? AND span_id = ? ORDER BY timestamp_ns ASC, id ASC",
        )
        .bind(trace_id.to_string())
        .bind(span_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| self.event_from_row(row)).collect()
    }

    // Debug session rows.

    /// Upsert a session row.
    pub async fn upsert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO debug_sessions (session_id, run_id, current_step_id, state,
                                        breakpoints, event_buffer, last_activity_ns,
                                        created_at_ns, expires_at_ns)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                current_step_id = excluded.current_step_id,
                state = excluded.state,
                breakpoints = excluded.breakpoints,
                event_buffer = excluded.event_buffer,
                last_activity_ns = excluded.last_activity_ns,
                expires_at_ns = excluded.expires_at_ns
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.run_id)
        .bind(&record.current_step_id)
        .bind(&record.state)
        .bind(&record.breakpoints_json)
        .bind(&record.event_buffer_json)
        .bind(record.last_activity_ns)
        .bind(record.created_at_ns)
        .bind(record.expires_at_ns)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a session row.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM debug_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| SessionRecord {
            session_id: row.get("session_id"),
            run_id: row.get("run_id"),
            current_step_id: row.get("current_step_id"),
            state: row.get("state"),
            breakpoints_json: row.get("breakpoints"),
            event_buffer_json: row.get("event_buffer"),
            last_activity_ns: row.get("last_activity_ns"),
            created_at_ns: row.get("created_at_ns"),
            expires_at_ns: row.get("expires_at_ns"),
        }))
    }

    /// Delete a session row.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM debug_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete sessions in any of the given states whose last activity is
    /// older than the cutoff. Returns the ids removed so in-memory caches
    /// can be purged.
    pub async fn delete_sessions_in_states_before(
        &self,
        states: &[&str],
        cutoff_ns: i64,
    ) -> Result<Vec<String>, StoreError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; states.len()].join(", ");
        let select = format!(
            "SELECT session_id FROM debug_sessions
             WHERE state IN ({placeholders}) AND last_activity_ns < ?"
        );
        let mut query = sqlx::query(&select);
        for state in states {
            query = query.bind(*state);
        }
        let rows = query.bind(cutoff_ns).fetch_all(&self.pool).await?;
        let ids: Vec<String> = rows.iter().map(|row| row.get("session_id")).collect();

        let delete = format!(
            "DELETE FROM debug_sessions
             WHERE state IN ({placeholders}) AND last_activity_ns < ?"
        );
        let mut query = sqlx::query(&delete);
        for state in states {
            query = query.bind(*state);
        }
        query.bind(cutoff_ns).execute(&self.pool).await?;
        Ok(ids)
    }
}

fn parse_trace_id(value: &str) -> Result<TraceId, StoreError> {
    TraceId::from_hex(value).map_err(|_| StoreError::Corrupt(format!("trace id {value:?}")))
}

fn parse_span_id(value: &str) -> Result<SpanId, StoreError> {
    SpanId::from_hex(value).map_err(|_| StoreError::Corrupt(format!("span id {value:?}")))
}

fn summary_from_row(row: &SqliteRow) -> Result<TraceSummary, StoreError> {
    Ok(TraceSummary {
        trace_id: parse_trace_id(&row.get::<String, _>("trace_id"))?,
        root_span_id: row
            .get::<Option<String>, _>("root_span_id")
            .map(|id| parse_span_id(&id))
            .transpose()?,
        name: row.get("name"),
        run_id: row.get("run_id"),
        start_time_ns: row.get("start_time_ns"),
        end_time_ns: row.get("end_time_ns"),
        duration_ns: row.get("duration_ns"),
        status_code: row.get("status_code"),
        span_count: row.get("span_count"),
        error_count: row.get("error_count"),
        created_at_ns: row.get("created_at_ns"),
        updated_at_ns: row.get("updated_at_ns"),
    })
}
