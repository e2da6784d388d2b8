//! `uploaded_files` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ingest::store::{FileStore, StoreResult};
use crate::ingest::types::UploadedFile;

#[derive(Debug, sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    blob_ref: String,
    original_name: String,
    size: i64,
    content_type: Option<String>,
    checksum: String,
    uploaded_at: DateTime<Utc>,
}

impl From<FileRow> for UploadedFile {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            blob_ref: row.blob_ref,
            original_name: row.original_name,
            size: row.size,
            content_type: row.content_type,
            checksum: row.checksum,
            uploaded_at: row.uploaded_at,
        }
    }
}

#[derive(Clone)]
pub struct PgFileStore {
    pool: PgPool,
}

impl PgFileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn create(&self, file: &UploadedFile) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO uploaded_files
                (id, blob_ref, original_name, size, content_type, checksum, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(file.id)
        .bind(&file.blob_ref)
        .bind(&file.original_name)
        .bind(file.size)
        .bind(&file.content_type)
        .bind(&file.checksum)
        .bind(file.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<UploadedFile>> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, blob_ref, original_name, size, content_type, checksum, uploaded_at
            FROM uploaded_files
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UploadedFile::from))
    }
}
