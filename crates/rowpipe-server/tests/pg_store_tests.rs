//! PostgreSQL store tests
//!
//! These tests require Docker to be running. Run with:
//!
//! ```bash
//! cargo test --test pg_store_tests -- --ignored --nocapture
//! ```

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::{init_test_tracing, TestPostgres};
use rowpipe_server::db::{PgFileStore, PgJobStore, PgRecordSink};
use rowpipe_server::ingest::{
    FileStore, Job, JobPatch, JobStatus, JobStore, ParsedRecord, RecordSink, UploadedFile,
};

fn uploaded_file() -> UploadedFile {
    let id = Uuid::new_v4();
    UploadedFile {
        id,
        blob_ref: format!("uploads/{}/people.csv", id),
        original_name: "people.csv".to_string(),
        size: 16,
        content_type: Some("text/csv".to_string()),
        checksum: "ab".repeat(32),
        uploaded_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_migrations_applied() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");

    for table in ["uploaded_files", "ingestion_jobs", "ingested_records"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(pg.pool())
        .await
        .expect("Failed to check table existence");
        assert!(exists, "table {} should exist", table);
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_file_store_roundtrip() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let files = PgFileStore::new(pg.pool().clone());

    let file = uploaded_file();
    files.create(&file).await.unwrap();

    let found = files.get(file.id).await.unwrap().expect("file exists");
    assert_eq!(found.blob_ref, file.blob_ref);
    assert_eq!(found.original_name, "people.csv");
    assert_eq!(found.content_type.as_deref(), Some("text/csv"));
    assert_eq!(found.size, 16);

    assert!(files.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_job_lifecycle_updates() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let jobs = PgJobStore::new(pg.pool().clone());

    let job = Job::queued(Uuid::new_v4(), "uploads/x/input.txt");
    jobs.create(&job).await.unwrap();

    let running = jobs
        .update(job.id, &JobPatch::running(Utc::now()))
        .await
        .unwrap()
        .expect("update applied");
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.attempts, 1);
    assert!(running.started_at.is_some());

    jobs.update(job.id, &JobPatch::progress(500, 0)).await.unwrap();
    let progressed = jobs
        .update(job.id, &JobPatch::progress(200, 3))
        .await
        .unwrap()
        .expect("update applied");
    assert_eq!(progressed.processed_count, 700);
    assert_eq!(progressed.failed_lines, 3);
    // absolute fields untouched by counter-only patches
    assert_eq!(progressed.status, JobStatus::Running);

    let failed = jobs
        .update(job.id, &JobPatch::failed(Utc::now(), "stream broke"))
        .await
        .unwrap()
        .expect("update applied");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("stream broke"));
    assert!(failed.finished_at.is_some());

    assert!(jobs
        .update(Uuid::new_v4(), &JobPatch::progress(1, 0))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cancel_guard_only_applies_to_queued() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let jobs = PgJobStore::new(pg.pool().clone());

    let queued = Job::queued(Uuid::new_v4(), "uploads/a/input.txt");
    let running = Job::queued(Uuid::new_v4(), "uploads/b/input.txt");
    jobs.create(&queued).await.unwrap();
    jobs.create(&running).await.unwrap();
    jobs.update(running.id, &JobPatch::running(Utc::now()))
        .await
        .unwrap();

    let cancelled = jobs
        .update(queued.id, &JobPatch::cancelled(Utc::now()))
        .await
        .unwrap()
        .expect("queued job cancelled");
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    assert!(jobs
        .update(running.id, &JobPatch::cancelled(Utc::now()))
        .await
        .unwrap()
        .is_none());
    let still_running = jobs.get(running.id).await.unwrap().unwrap();
    assert_eq!(still_running.status, JobStatus::Running);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_start_and_requeue_guards() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let jobs = PgJobStore::new(pg.pool().clone());

    let cancelled = Job::queued(Uuid::new_v4(), "uploads/c/input.txt");
    jobs.create(&cancelled).await.unwrap();
    jobs.update(cancelled.id, &JobPatch::cancelled(Utc::now()))
        .await
        .unwrap()
        .expect("queued job cancelled");
    assert!(jobs
        .update(cancelled.id, &JobPatch::running(Utc::now()))
        .await
        .unwrap()
        .is_none());
    let untouched = jobs.get(cancelled.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, JobStatus::Cancelled);
    assert_eq!(untouched.attempts, 0);

    let interrupted = Job::queued(Uuid::new_v4(), "uploads/i/input.txt");
    jobs.create(&interrupted).await.unwrap();
    jobs.update(interrupted.id, &JobPatch::running(Utc::now()))
        .await
        .unwrap();
    let requeued = jobs
        .update(interrupted.id, &JobPatch::requeued())
        .await
        .unwrap()
        .expect("running job requeued");
    assert_eq!(requeued.status, JobStatus::Queued);
    assert_eq!(requeued.attempts, 1);
    assert!(jobs
        .update(interrupted.id, &JobPatch::requeued())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_find_by_status_oldest_first() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let jobs = PgJobStore::new(pg.pool().clone());

    let mut newer = Job::queued(Uuid::new_v4(), "uploads/n/input.txt");
    newer.created_at = Utc::now() - ChronoDuration::seconds(5);
    let mut older = Job::queued(Uuid::new_v4(), "uploads/o/input.txt");
    older.created_at = Utc::now() - ChronoDuration::seconds(60);
    let mut finished = Job::queued(Uuid::new_v4(), "uploads/f/input.txt");
    finished.status = JobStatus::Succeeded;

    for job in [&newer, &older, &finished] {
        jobs.create(job).await.unwrap();
    }

    let unfinished = jobs
        .find_by_status(&JobStatus::unfinished(), None)
        .await
        .unwrap();
    let ids: Vec<Uuid> = unfinished.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![older.id, newer.id]);

    let limited = jobs
        .find_by_status(&JobStatus::unfinished(), Some(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, older.id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_record_sink_is_idempotent_per_line() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let files = PgFileStore::new(pg.pool().clone());
    let jobs = PgJobStore::new(pg.pool().clone());
    let sink = PgRecordSink::new(pg.pool().clone());

    let file = uploaded_file();
    files.create(&file).await.unwrap();
    let job = Job::queued(file.id, file.blob_ref.clone());
    jobs.create(&job).await.unwrap();

    let records = vec![
        ParsedRecord {
            line_number: 2,
            data: json!({"name": "Ada", "age": "30"}),
        },
        ParsedRecord {
            line_number: 3,
            data: json!({"raw": "free text"}),
        },
    ];

    sink.insert_batch(file.id, job.id, &records).await.unwrap();
    // a recovered job writes the same lines again
    sink.insert_batch(file.id, job.id, &records).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingested_records WHERE job_id = $1")
        .bind(job.id)
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(count, 2);

    let data: serde_json::Value = sqlx::query_scalar(
        "SELECT data FROM ingested_records WHERE job_id = $1 AND line_number = 2",
    )
    .bind(job.id)
    .fetch_one(pg.pool())
    .await
    .unwrap();
    assert_eq!(data, json!({"name": "Ada", "age": "30"}));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_large_batch_spans_several_statements() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("Failed to start PostgreSQL");
    let jobs = PgJobStore::new(pg.pool().clone());
    let sink = PgRecordSink::new(pg.pool().clone());

    let job = Job::queued(Uuid::new_v4(), "uploads/big/input.txt");
    jobs.create(&job).await.unwrap();

    let records: Vec<ParsedRecord> = (1..=2500)
        .map(|n| ParsedRecord {
            line_number: n,
            data: json!({ "n": n }),
        })
        .collect();
    sink.insert_batch(job.file_id, job.id, &records).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingested_records WHERE job_id = $1")
        .bind(job.id)
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(count, 2500);
}
