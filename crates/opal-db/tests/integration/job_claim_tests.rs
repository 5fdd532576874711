use std::time::Duration;

use opal_core::job::{CreateJobRequest, JobStatus, JobType};
use opal_core::job_store::JobStore;
use opal_db::PgJobStore;

use crate::integration::common::{register_test_file, setup_test_db};

const STALE_AFTER: Duration = Duration::from_secs(600);

#[tokio::test]
async fn create_job_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(
            CreateJobRequest::new(file.id, JobType::DocumentAnalysis)
                .with_provider_preference("anthropic"),
        )
        .await
        .unwrap();

    assert_eq!(job.file_id, file.id);
    assert_eq!(job.job_type, JobType::DocumentAnalysis);
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempt_count, 0);
    assert_eq!(job.max_attempts, 3);
    assert_eq!(job.provider_preference.as_deref(), Some("anthropic"));
    assert!(job.locked_by.is_none());
    assert!(job.not_before.is_none());
}

#[tokio::test]
async fn create_job_with_custom_max_attempts() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::Ocr).with_max_attempts(10))
        .await
        .unwrap();

    assert_eq!(job.max_attempts, 10);
}

#[tokio::test]
async fn claim_sets_running_and_lock() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    let claimed = store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .expect("Should claim the job");

    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.locked_by.as_deref(), Some("worker-1"));
    assert!(claimed.locked_at.is_some());
}

#[tokio::test]
async fn claim_returns_none_when_empty() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let claimed = store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap();
    assert!(claimed.is_none());
}

#[tokio::test]
async fn claim_is_exclusive_under_contention() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    // Ten concurrent claims against one queued row: exactly one winner.
    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .claim_next(&format!("worker-{i}"), &JobType::ALL, STALE_AFTER)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if let Some(claimed) = handle.await.unwrap() {
            assert_eq!(claimed.id, job.id);
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn claim_skips_running_jobs() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    let first = store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap();
    assert!(first.is_some());

    let second = store
        .claim_next("worker-2", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn claim_respects_backoff_window() {
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

    // Requeue with a backoff still in the future.
    let next = chrono::Utc::now() + chrono::TimeDelta::minutes(5);
    store.fail_job(job.id, "timeout", Some(next)).await.unwrap();

    let claimed = store
        .claim_next("worker-2", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap();
    assert!(claimed.is_none(), "backoff window must defer the claim");

    // Move the backoff into the past; the job becomes claimable.
    sqlx::query("UPDATE analysis_jobs SET not_before = NOW() - INTERVAL '1 second' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let claimed = store
        .claim_next("worker-2", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .expect("expired backoff must be claimable");
    assert_eq!(claimed.attempt_count, 1);
}

#[tokio::test]
async fn claim_filters_by_job_type() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    store
        .create_job(CreateJobRequest::new(file.id, JobType::Ocr))
        .await
        .unwrap();

    let claimed = store
        .claim_next("worker-1", &[JobType::DocumentAnalysis], STALE_AFTER)
        .await
        .unwrap();
    assert!(claimed.is_none());

    let claimed = store
        .claim_next("worker-1", &[JobType::Ocr], STALE_AFTER)
        .await
        .unwrap();
    assert!(claimed.is_some());
}

#[tokio::test]
async fn claim_prefers_oldest_job() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let first = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    // Force distinct created_at ordering.
    sqlx::query("UPDATE analysis_jobs SET created_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(first.id)
        .execute(&pool)
        .await
        .unwrap();

    let claimed = store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, first.id);
}

#[tokio::test]
async fn stale_lock_is_reclaimed() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    store
        .claim_next("dead-worker", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    // Fresh lock: not reclaimable.
    let claimed = store
        .claim_next("worker-2", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap();
    assert!(claimed.is_none());

    // Age the lock past the stale threshold.
    sqlx::query("UPDATE analysis_jobs SET locked_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let claimed = store
        .claim_next("worker-2", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .expect("stale lock must be reclaimable");
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.locked_by.as_deref(), Some("worker-2"));
}

#[tokio::test]
async fn cancel_job_and_probe() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let job = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    assert!(!store.is_cancelled(job.id).await.unwrap());
    store.cancel_job(job.id).await.unwrap();
    assert!(store.is_cancelled(job.id).await.unwrap());

    let updated = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(updated.status, JobStatus::Cancelled);

    // Cancelled rows are not claimable.
    let claimed = store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap();
    assert!(claimed.is_none());
}

#[tokio::test]
async fn cancel_does_not_touch_completed_jobs() {
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
        .complete_job(job.id, &crate::integration::common::test_result(job.id, file.id))
        .await
        .unwrap();

    store.cancel_job(job.id).await.unwrap();

    let updated = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(updated.status, JobStatus::Completed);
}

#[tokio::test]
async fn release_worker_jobs_requeues_only_that_worker() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    let first = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();
    let second = store
        .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
        .await
        .unwrap();

    store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();
    store
        .claim_next("worker-2", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    let released = store.release_worker_jobs("worker-1").await.unwrap();
    assert_eq!(released, 1);

    let first = store.get_job(first.id).await.unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Queued);
    assert!(first.locked_by.is_none());

    let second = store.get_job(second.id).await.unwrap().unwrap();
    assert_eq!(second.status, JobStatus::Running);
    assert_eq!(second.locked_by.as_deref(), Some("worker-2"));
}

#[tokio::test]
async fn list_and_count_by_status() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());
    let file = register_test_file(&pool).await;

    for _ in 0..3 {
        store
            .create_job(CreateJobRequest::new(file.id, JobType::DocumentAnalysis))
            .await
            .unwrap();
    }
    store
        .claim_next("worker-1", &JobType::ALL, STALE_AFTER)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(store.count_by_status(JobStatus::Queued).await.unwrap(), 2);
    assert_eq!(store.count_by_status(JobStatus::Running).await.unwrap(), 1);

    let queued = store.list_jobs(Some(JobStatus::Queued), 10).await.unwrap();
    assert_eq!(queued.len(), 2);
    let all = store.list_jobs(None, 10).await.unwrap();
    assert_eq!(all.len(), 3);
}
