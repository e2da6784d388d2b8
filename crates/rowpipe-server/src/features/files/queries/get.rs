//! Get uploaded file query

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::{FileStore, StoreError, UploadedFile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileQuery {
    pub file_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum GetFileError {
    #[error("File '{0}' not found")]
    NotFound(Uuid),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<GetFileError> for AppError {
    fn from(err: GetFileError) -> Self {
        match err {
            GetFileError::NotFound(_) => AppError::NotFound(err.to_string()),
            GetFileError::Store(e) => AppError::Store(e),
        }
    }
}

pub async fn handle(files: &dyn FileStore, query: GetFileQuery) -> Result<UploadedFile, GetFileError> {
    files
        .get(query.file_id)
        .await?
        .ok_or(GetFileError::NotFound(query.file_id))
}
