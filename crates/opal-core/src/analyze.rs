use std::time::Instant;

use crate::error::AppError;
use crate::job::AnalysisJob;
use crate::models::{FileRef, NewAnalysisResult};
use crate::provider::Provider;
use crate::router::ProviderRouter;
use crate::stage::{ObjectStore, StagedDocument, Stager};

/// Orchestrates one analysis cycle: stage the file, run it through the
/// provider chain, and shape the normalized outcome into a persistable
/// result.
///
/// Generic over storage and providers via traits, so the worker can be
/// exercised in tests without real object storage or AI backends. Staging
/// and analysis are separate calls so the worker can insert cancellation
/// checks between the expensive steps.
#[derive(Clone)]
pub struct AnalysisService<S, P>
where
    S: ObjectStore,
    P: Provider,
{
    stager: Stager<S>,
    router: ProviderRouter<P>,
}

impl<S, P> AnalysisService<S, P>
where
    S: ObjectStore,
    P: Provider,
{
    pub fn new(stager: Stager<S>, router: ProviderRouter<P>) -> Self {
        Self { stager, router }
    }

    /// Download and verify the job's file into a scratch copy.
    pub async fn stage(&self, file_ref: &FileRef) -> Result<StagedDocument, AppError> {
        self.stager.stage(file_ref).await
    }

    /// Run the staged document through the fallback chain and build the
    /// result row for this job.
    pub async fn analyze(
        &self,
        job: &AnalysisJob,
        file_ref: &FileRef,
        staged: &StagedDocument,
    ) -> Result<NewAnalysisResult, AppError> {
        let started = Instant::now();

        let outcome = self
            .router
            .analyze(
                &staged.document,
                job.job_type,
                job.provider_preference.as_deref(),
            )
            .await?;

        let elapsed_ms = started.elapsed().as_millis() as i64;
        tracing::info!(
            job_id = %job.id,
            provider = %outcome.provider_used,
            confidence = outcome.confidence_score,
            elapsed_ms,
            "Analysis complete"
        );

        Ok(NewAnalysisResult {
            job_id: job.id,
            file_id: file_ref.id,
            provider_used: outcome.provider_used,
            model: outcome.model,
            analysis_type: job.job_type,
            summary: outcome.summary,
            extracted_entities: outcome.extracted_entities,
            confidence_score: outcome.confidence_score,
            raw_text: outcome.raw_text,
            tokens_used: outcome.tokens_used,
            processing_time_ms: Some(elapsed_ms),
        })
    }
}
