//! On-disk round-trip tests for the span store.

use conductor_api::{KeyValue, SpanId, SpanKind, Status, TraceId};
use conductor_store::{
    EncryptionKey, SessionRecord, SpanStore, StoreConfig, StoredEvent, StoredSpan, TraceFilter,
};
use sqlx::Row;

fn trace_id(n: u128) -> TraceId {
    TraceId::from(n)
}

fn span_id(n: u64) -> SpanId {
    SpanId::from(n)
}

fn sample_span(trace: u128, span: u64, start_ns: i64) -> StoredSpan {
    StoredSpan {
        trace_id: trace_id(trace),
        span_id: span_id(span),
        parent_span_id: None,
        name: "root".into(),
        kind: SpanKind::Internal,
        start_time_ns: start_ns,
        end_time_ns: Some(start_ns + 100_000_000),
        status: Status::Ok,
        attributes: vec![KeyValue::new("k", "v")],
        events: Vec::new(),
    }
}

async fn open_store(dir: &tempfile::TempDir, key: Option<EncryptionKey>) -> SpanStore {
    let config = StoreConfig::new(dir.path().join("traces.db"));
    SpanStore::open_with_key(config, key).await.unwrap()
}

#[tokio::test]
async fn write_and_read_a_trace() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let t0 = 1_700_000_000_000_000_000i64;
    let span = sample_span(0xaa01, 0xbb01, t0);
    store.store_span(&span).await.unwrap();

    let spans = store.get_trace_spans(trace_id(0xaa01)).await.unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0], span);

    let listed = store.list_traces(&TraceFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].trace_id, trace_id(0xaa01));

    let summary = store
        .get_trace_summary(trace_id(0xaa01))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.span_count, 1);
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.duration_ns, Some(100_000_000));
    assert_eq!(summary.status_code, "ok");
    assert_eq!(summary.root_span_id, Some(span_id(0xbb01)));
}

#[tokio::test]
async fn attributes_round_trip_bit_exact_under_encryption() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, Some(EncryptionKey::from_material("hunter2"))).await;

    let mut span = sample_span(1, 1, 1_000);
    span.attributes = vec![
        KeyValue::new("api_key", "sk-1234567890abcdef"),
        KeyValue::new("count", 42i64),
        KeyValue::new("ratio", 0.25f64),
        KeyValue::new("flag", true),
    ];
    span.events = vec![StoredEvent {
        name: "llm.request".into(),
        timestamp_ns: 1_500,
        attributes: vec![KeyValue::new("token", "secret-token")],
    }];
    store.store_span(&span).await.unwrap();

    let read_back = store
        .get_span(trace_id(1), span_id(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read_back, span);
}

#[tokio::test]
async fn raw_rows_never_contain_plaintext_when_encrypted() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, Some(EncryptionKey::from_material("hunter2"))).await;

    let mut span = sample_span(2, 2, 1_000);
    span.attributes = vec![KeyValue::new("api_key", "sk-1234567890abcdef")];
    store.store_span(&span).await.unwrap();

    let row = sqlx::query("SELECT attributes FROM spans WHERE trace_id = ?")
        .bind(trace_id(2).to_string())
        .fetch_one(store.pool())
        .await
        .unwrap();
    let raw: String = row.get("attributes");
    assert!(!raw.contains("sk-1234567890abcdef"));
    assert!(!raw.contains("api_key"));
}

#[tokio::test]
async fn plaintext_store_keeps_json_readable() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let span = sample_span(3, 3, 1_000);
    store.store_span(&span).await.unwrap();

    let row = sqlx::query("SELECT attributes FROM spans WHERE trace_id = ?")
        .bind(trace_id(3).to_string())
        .fetch_one(store.pool())
        .await
        .unwrap();
    let raw: String = row.get("attributes");
    assert!(raw.contains("\"k\""));
}

#[tokio::test]
async fn encryption_required_without_key_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::new(dir.path().join("traces.db"));
    config.require_encryption = true;
    assert!(SpanStore::open_with_key(config, None).await.is_err());
}

#[tokio::test]
async fn trace_summary_aggregates_children() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let mut root = sample_span(4, 1, 1_000);
    root.end_time_ns = Some(5_000);
    store.store_span(&root).await.unwrap();

    let mut child = sample_span(4, 2, 1_500);
    child.parent_span_id = Some(span_id(1));
    child.name = "step".into();
    child.end_time_ns = Some(9_000);
    child.status = Status::error("step exploded");
    store.store_span(&child).await.unwrap();

    let summary = store.get_trace_summary(trace_id(4)).await.unwrap().unwrap();
    assert_eq!(summary.span_count, 2);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.start_time_ns, 1_000);
    assert_eq!(summary.end_time_ns, Some(9_000));
    assert_eq!(summary.status_code, "ok");
    assert_eq!(summary.name, "root");
}

#[tokio::test]
async fn in_flight_spans_leave_end_time_null() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let mut span = sample_span(5, 1, 1_000);
    span.end_time_ns = None;
    store.store_span(&span).await.unwrap();

    let summary = store.get_trace_summary(trace_id(5)).await.unwrap().unwrap();
    assert_eq!(summary.end_time_ns, None);
    assert_eq!(summary.duration_ns, None);
}

#[tokio::test]
async fn list_traces_filters_and_orders() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    for (trace, start, ok) in [(10u128, 1_000i64, true), (11, 2_000, false), (12, 3_000, true)] {
        let mut span = sample_span(trace, 1, start);
        if !ok {
            span.status = Status::error("failed");
        }
        store.store_span(&span).await.unwrap();
    }

    let all = store.list_traces(&TraceFilter::default()).await.unwrap();
    let ids: Vec<_> = all.iter().map(|t| t.trace_id).collect();
    assert_eq!(ids, vec![trace_id(12), trace_id(11), trace_id(10)]);

    let errors = store
        .list_traces(&TraceFilter {
            status: Some("error".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].trace_id, trace_id(11));

    let windowed = store
        .list_traces(&TraceFilter {
            since_ns: Some(1_500),
            until_ns: Some(2_500),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(windowed.len(), 1);
    assert_eq!(windowed[0].trace_id, trace_id(11));
}

#[tokio::test]
async fn run_id_lookup_uses_denormalized_column() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, Some(EncryptionKey::from_material("hunter2"))).await;

    let mut span = sample_span(20, 1, 1_000);
    span.attributes = vec![KeyValue::new("workflow.run_id", "r1")];
    store.store_span(&span).await.unwrap();

    // The run id is findable even though attribute blobs are encrypted.
    let found = store.get_trace_by_run_id("r1").await.unwrap();
    assert_eq!(found, Some(trace_id(20)));
    assert_eq!(store.get_trace_by_run_id("r2").await.unwrap(), None);

    let summary = store.get_trace_summary(trace_id(20)).await.unwrap().unwrap();
    assert_eq!(summary.run_id.as_deref(), Some("r1"));
}

#[tokio::test]
async fn run_id_scan_falls_back_for_legacy_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let mut span = sample_span(21, 1, 1_000);
    span.attributes = vec![KeyValue::new("workflow.run_id", "legacy-run")];
    store.store_span(&span).await.unwrap();

    // Simulate a row written before run_id was denormalized.
    sqlx::query("UPDATE traces SET run_id = NULL WHERE trace_id = ?")
        .bind(trace_id(21).to_string())
        .execute(store.pool())
        .await
        .unwrap();

    let found = store.get_trace_by_run_id("legacy-run").await.unwrap();
    assert_eq!(found, Some(trace_id(21)));
}

#[tokio::test]
async fn retention_deletes_and_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let mut old = sample_span(30, 1, 1_000);
    old.events = vec![StoredEvent {
        name: "old-event".into(),
        timestamp_ns: 1_100,
        attributes: Vec::new(),
    }];
    store.store_span(&old).await.unwrap();
    store.store_span(&sample_span(31, 1, 10_000)).await.unwrap();

    let deleted = store.delete_traces_older_than(5_000).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(store.get_trace_summary(trace_id(30)).await.unwrap().is_none());
    assert!(store.get_span(trace_id(30), span_id(1)).await.unwrap().is_none());
    assert!(store.get_trace_summary(trace_id(31)).await.unwrap().is_some());

    let orphan_events = sqlx::query("SELECT COUNT(*) AS n FROM events WHERE trace_id = ?")
        .bind(trace_id(30).to_string())
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(orphan_events.get::<i64, _>("n"), 0);
}

#[tokio::test]
async fn upsert_replaces_span_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let mut span = sample_span(40, 1, 1_000);
    span.end_time_ns = None;
    store.store_span(&span).await.unwrap();

    span.name = "renamed".into();
    span.end_time_ns = Some(2_000);
    span.status = Status::error("late failure");
    store.store_span(&span).await.unwrap();

    let read_back = store
        .get_span(trace_id(40), span_id(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read_back.name, "renamed");
    assert_eq!(read_back.end_time_ns, Some(2_000));
    assert_eq!(read_back.status, Status::error("late failure"));

    let summary = store.get_trace_summary(trace_id(40)).await.unwrap().unwrap();
    assert_eq!(summary.span_count, 1);
    assert_eq!(summary.error_count, 1);
}

#[tokio::test]
async fn session_rows_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, None).await;

    let record = SessionRecord {
        session_id: "r1-1".into(),
        run_id: "r1".into(),
        current_step_id: Some("s2".into()),
        state: "paused".into(),
        breakpoints_json: "[\"s2\"]".into(),
        event_buffer_json: "[]".into(),
        last_activity_ns: 5_000,
        created_at_ns: 1_000,
        expires_at_ns: 100_000,
    };
    store.upsert_session(&record).await.unwrap();

    let read_back = store.get_session("r1-1").await.unwrap().unwrap();
    assert_eq!(read_back, record);

    let mut updated = record.clone();
    updated.state = "completed".into();
    updated.last_activity_ns = 6_000;
    store.upsert_session(&updated).await.unwrap();
    assert_eq!(store.get_session("r1-1").await.unwrap().unwrap().state, "completed");

    let removed = store
        .delete_sessions_in_states_before(&["completed", "failed"], 10_000)
        .await
        .unwrap();
    assert_eq!(removed, vec!["r1-1".to_owned()]);
    assert!(store.get_session("r1-1").await.unwrap().is_none());
}
