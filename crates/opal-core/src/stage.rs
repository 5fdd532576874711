use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::models::{FileRef, compute_checksum};
use crate::provider::Document;

/// Metadata for a stored object, readable without downloading it.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub checksum: Option<String>,
}

/// Read access to the storage layer holding uploaded files.
pub trait ObjectStore: Send + Sync + Clone {
    fn get_object(&self, key: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;

    fn stat(&self, key: &str) -> impl Future<Output = Result<ObjectMeta, AppError>> + Send;
}

/// A staged local copy of an uploaded file.
///
/// Holds a named temp file that is removed when this value is dropped, so
/// the scratch copy disappears on every exit path: success, provider
/// failure, cancellation, or panic unwind.
#[derive(Debug)]
pub struct StagedDocument {
    pub document: Document,
    path: PathBuf,
    _guard: NamedTempFile,
}

impl StagedDocument {
    /// Path of the scratch copy, valid for the lifetime of this value.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Downloads files to a scratch location and verifies their integrity.
#[derive(Clone)]
pub struct Stager<S: ObjectStore> {
    store: S,
    scratch_dir: PathBuf,
}

impl<S: ObjectStore> Stager<S> {
    pub fn new(store: S, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Fetch the file's bytes, verify them against the registered checksum,
    /// and write them to a scratch file.
    ///
    /// A checksum mismatch is a permanent failure: a corrupted source will
    /// not self-heal on resubmission, so it is never retried.
    pub async fn stage(&self, file_ref: &FileRef) -> Result<StagedDocument, AppError> {
        // When the store exposes a checksum in object metadata, a mismatch
        // is caught before the download. The full-body verification below
        // still runs; the header is advisory.
        let meta = self.store.stat(&file_ref.storage_key).await?;
        if let Some(remote) = &meta.checksum
            && *remote != file_ref.checksum
        {
            return Err(AppError::IntegrityMismatch {
                expected: file_ref.checksum.clone(),
                actual: remote.clone(),
            });
        }

        let bytes = self.store.get_object(&file_ref.storage_key).await?;

        let actual = compute_checksum(&bytes);
        if actual != file_ref.checksum {
            return Err(AppError::IntegrityMismatch {
                expected: file_ref.checksum.clone(),
                actual,
            });
        }

        std::fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| AppError::StagingError(format!("create scratch dir: {e}")))?;

        let file_name = file_ref
            .storage_key
            .rsplit('/')
            .next()
            .unwrap_or(&file_ref.storage_key)
            .to_string();

        let mut guard = tempfile::Builder::new()
            .prefix(&format!("{}_", file_ref.id))
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| AppError::StagingError(format!("create scratch file: {e}")))?;
        guard
            .write_all(&bytes)
            .map_err(|e| AppError::StagingError(format!("write scratch file: {e}")))?;

        let path = guard.path().to_path_buf();
        tracing::debug!(
            file_id = %file_ref.id,
            bytes = bytes.len(),
            path = %path.display(),
            "Staged file"
        );

        Ok(StagedDocument {
            document: Document {
                bytes,
                mime_type: file_ref.mime_type.clone(),
                file_name,
            },
            path,
            _guard: guard,
        })
    }
}
