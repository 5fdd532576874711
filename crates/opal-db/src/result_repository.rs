use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use opal_core::error::AppError;
use opal_core::job::JobType;
use opal_core::models::AnalysisResult;

/// Read access to persisted analysis results.
///
/// Writes go through the job store's finalize path so the result insert
/// and the job state change stay in one transaction.
#[derive(Clone)]
pub struct AnalysisResultRepository {
    pool: Pool<Postgres>,
}

impl AnalysisResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the result for a job, if the job has completed.
    pub async fn get_by_job(&self, job_id: Uuid) -> Result<Option<AnalysisResult>, AppError> {
        let row = sqlx::query_as::<_, AnalysisResultRow>(
            r#"SELECT * FROM analysis_results WHERE job_id = $1"#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Results for a file across all of its jobs, newest first.
    pub async fn list_for_file(
        &self,
        file_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AnalysisResult>, AppError> {
        let rows = sqlx::query_as::<_, AnalysisResultRow>(
            r#"
            SELECT * FROM analysis_results
            WHERE file_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(file_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisResultRow {
    id: Uuid,
    job_id: Uuid,
    file_id: Uuid,
    provider_used: String,
    model: String,
    analysis_type: String,
    summary: Option<String>,
    extracted_entities: serde_json::Value,
    confidence_score: f32,
    raw_text: String,
    tokens_used: Option<i64>,
    processing_time_ms: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<AnalysisResultRow> for AnalysisResult {
    fn from(row: AnalysisResultRow) -> Self {
        AnalysisResult {
            id: row.id,
            job_id: row.job_id,
            file_id: row.file_id,
            provider_used: row.provider_used,
            model: row.model,
            analysis_type: row
                .analysis_type
                .parse()
                .unwrap_or(JobType::DocumentAnalysis),
            summary: row.summary,
            extracted_entities: row.extracted_entities,
            confidence_score: row.confidence_score,
            raw_text: row.raw_text,
            tokens_used: row.tokens_used,
            processing_time_ms: row.processing_time_ms,
            created_at: row.created_at,
        }
    }
}
