use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::{BlobStore, FileStore, StoreError, UploadedFile};
use crate::storage::build_upload_key;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileCommand {
    pub filename: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileResponse {
    pub file_id: Uuid,
    pub blob_ref: String,
    pub size: i64,
    pub checksum: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadFileError {
    #[error("Multipart field 'file' is required")]
    FileFieldMissing,
    #[error("Filename is required and cannot be empty")]
    FilenameRequired,
    #[error("Filename must not exceed 255 characters")]
    FilenameLength,
    #[error("Filename must not contain path separators")]
    FilenameInvalid,
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<UploadFileError> for AppError {
    fn from(err: UploadFileError) -> Self {
        match err {
            UploadFileError::Store(e) => AppError::Store(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl UploadFileCommand {
    pub fn validate(&self) -> Result<(), UploadFileError> {
        let name = self.filename.trim();
        if name.is_empty() {
            return Err(UploadFileError::FilenameRequired);
        }
        if name.len() > 255 {
            return Err(UploadFileError::FilenameLength);
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(UploadFileError::FilenameInvalid);
        }
        Ok(())
    }
}

/// Store the bytes under `uploads/{file_id}/{filename}` and record the file
#[tracing::instrument(skip(files, blobs, command), fields(filename = %command.filename))]
pub async fn handle(
    files: &dyn FileStore,
    blobs: &dyn BlobStore,
    command: UploadFileCommand,
) -> Result<UploadFileResponse, UploadFileError> {
    command.validate()?;

    let file_id = Uuid::new_v4();
    let original_name = command.filename.trim().to_string();
    let key = build_upload_key(file_id, &original_name);

    let stored = blobs
        .put(&key, command.content, command.content_type.clone())
        .await?;

    let file = UploadedFile {
        id: file_id,
        blob_ref: stored.key,
        original_name,
        size: stored.size,
        content_type: command.content_type,
        checksum: stored.checksum,
        uploaded_at: Utc::now(),
    };
    files.create(&file).await?;

    Ok(UploadFileResponse {
        file_id: file.id,
        blob_ref: file.blob_ref,
        size: file.size,
        checksum: file.checksum,
    })
}
