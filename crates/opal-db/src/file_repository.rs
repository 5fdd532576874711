use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use opal_core::error::AppError;
use opal_core::models::{FileRef, FileStatus, NewFileRef};

/// Repository for the file registry.
#[derive(Clone)]
pub struct FileRepository {
    pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    storage_key: String,
    checksum: String,
    mime_type: String,
    status: String,
}

impl From<FileRow> for FileRef {
    fn from(row: FileRow) -> Self {
        FileRef {
            id: row.id,
            storage_key: row.storage_key,
            checksum: row.checksum,
            mime_type: row.mime_type,
            status: row.status.parse().unwrap_or(FileStatus::Pending),
        }
    }
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register an uploaded object with its verified checksum.
    pub async fn register(&self, file: &NewFileRef) -> Result<FileRef, AppError> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            INSERT INTO files (storage_key, checksum, mime_type)
            VALUES ($1, $2, $3)
            RETURNING id, storage_key, checksum, mime_type, status
            "#,
        )
        .bind(&file.storage_key)
        .bind(&file.checksum)
        .bind(&file.mime_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }

    pub async fn get(&self, file_id: Uuid) -> Result<Option<FileRef>, AppError> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"SELECT id, storage_key, checksum, mime_type, status FROM files WHERE id = $1"#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    pub async fn set_status(&self, file_id: Uuid, status: FileStatus) -> Result<(), AppError> {
        sqlx::query(r#"UPDATE files SET status = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(file_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
