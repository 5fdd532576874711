use std::time::Duration;

use opal_core::job::{CreateJobRequest, JobStatus, JobType};
use opal_core::job_store::JobStore;
use opal_core::models::FileStatus;
use opal_db::{AnalysisResultRepository, PgJobStore};

use crate::integration::common::{register_test_file, setup_test_db, test_result};

const STALE_AFTER: Duration = Duration::from_secs(600);

#[tokio::test]
async fn complete_job_persists_result_and_statuses() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    let result_id = store
        .complete_job(job.id, &test_result(job.id, file.id))
        .await
        .unwrap();

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_id, Some(result_id));
    assert!(job.completed_at.is_some());
    assert!(job.locked_by.is_none());

    let file = store.get_file(file.id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Completed);

    let result = AnalysisResultRepository::new(pool)
        .get_by_job(job.id)
        .await
        .unwrap()
        .expect("Result row should exist");
    assert_eq!(result.id, result_id);
    assert_eq!(result.provider_used, "anthropic");
    assert_eq!(result.confidence_score, 0.85);
    assert_eq!(result.extracted_entities["document_type"], "deed");
}

#[tokio::test]
async fn complete_job_is_idempotent() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    let result = test_result(job.id, file.id);
    let first = store.complete_job(job.id, &result).await.unwrap();
    let second = store.complete_job(job.id, &result).await.unwrap();
    assert_eq!(first, second);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM analysis_results WHERE job_id = $1")
            .bind(job.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_id, Some(first));
}

#[tokio::test]
async fn fail_job_with_backoff_requeues() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    let next = chrono::Utc::now() + chrono::TimeDelta::seconds(30);
    store
        .fail_job(job.id, "provider timeout", Some(next))
        .await
        .unwrap();

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempt_count, 1);
    assert_eq!(job.last_error.as_deref(), Some("provider timeout"));
    assert!(job.not_before.is_some());
    assert!(job.locked_by.is_none());
    assert!(job.locked_at.is_none());
    assert!(job.completed_at.is_none());

    // A transient failure leaves the file waiting for the retry.
    let file = store.get_file(file.id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Pending);
}

#[tokio::test]
async fn fail_job_without_backoff_is_terminal() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    store
        .fail_job(job.id, "checksum mismatch", None)
        .await
        .unwrap();

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempt_count, 1);
    assert!(job.completed_at.is_some());
    assert!(job.not_before.is_none());

    let file = store.get_file(file.id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Failed);
}

#[tokio::test]
async fn fail_job_ignores_non_running_jobs() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    // Still queued: a stray finalize must not consume attempt budget.
    store.fail_job(job.id, "stray finalize", None).await.unwrap();

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempt_count, 0);
    assert!(job.last_error.is_none());

    let file = store.get_file(file.id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Pending);
}

#[tokio::test]
async fn duplicate_fail_does_not_double_increment() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    let next = chrono::Utc::now() + chrono::TimeDelta::seconds(30);
    store.fail_job(job.id, "timeout", Some(next)).await.unwrap();
    store.fail_job(job.id, "timeout", Some(next)).await.unwrap();

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.attempt_count, 1);
}

#[tokio::test]
async fn full_retry_cycle_ends_completed() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    // Two transient failures with an already-expired backoff, then success.
    for _ in 0..2 {
        store
            .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
            .await
            .unwrap()
            .unwrap();
        let next = chrono::Utc::now() - chrono::TimeDelta::seconds(1);
        store.fail_job(job.id, "timeout", Some(next)).await.unwrap();
    }

    let claimed = store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.attempt_count, 2);

    store
        .complete_job(job.id, &test_result(job.id, file.id))
        .await
        .unwrap();

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempt_count, 2);
    assert!(job.result_id.is_some());
}

#[tokio::test]
async fn results_are_listed_per_file() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    for _ in 0..2 {
        let job = store
            .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
            .await
            .unwrap();
        store
            .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
            .await
            .unwrap()
            .unwrap();
        store
            .complete_job(job.id, &test_result(job.id, file.id))
            .await
            .unwrap();
    }

    let results = AnalysisResultRepository::new(pool)
        .list_for_file(file.id, 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.file_id == file.id));
}
