use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::response::ApiResponse;
use crate::error::{ApiResult, AppError};
use crate::features::jobs::commands::{create, CreateJobCommand};
use crate::features::{parse_id, FeatureState};

use super::commands::{upload, UploadFileCommand, UploadFileError};
use super::queries::{get as get_file_query, GetFileQuery};

/// Largest accepted upload body
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

pub fn files_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", post(upload_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .route("/:file_id", get(get_file))
        .route("/:file_id/process", post(process_file))
}

/// Optional body of `POST /files/:file_id/process`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFileRequest {
    /// Overrides the blob reference recorded at upload time
    pub blob_ref: Option<String>,
}

/// POST /files (multipart, field `file`)
#[tracing::instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<FeatureState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut upload: Option<UploadFileCommand> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let content = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file bytes: {}", e)))?;

        upload = Some(UploadFileCommand {
            filename,
            content: content.to_vec(),
            content_type,
        });
    }

    let command = upload.ok_or(UploadFileError::FileFieldMissing)?;
    let response = upload::handle(state.files.as_ref(), state.blobs.as_ref(), command).await?;

    tracing::info!(
        file_id = %response.file_id,
        blob_ref = %response.blob_ref,
        size = response.size,
        "File uploaded"
    );

    Ok(ApiResponse::success(response).with_status(StatusCode::CREATED))
}

/// GET /files/:file_id
async fn get_file(
    State(state): State<FeatureState>,
    Path(file_id): Path<String>,
) -> ApiResult<Response> {
    let query = GetFileQuery {
        file_id: parse_id(&file_id, "file")?,
    };
    let file = get_file_query::handle(state.files.as_ref(), query).await?;
    Ok(ApiResponse::success(file).with_status(StatusCode::OK))
}

/// POST /files/:file_id/process
#[tracing::instrument(skip(state, body))]
async fn process_file(
    State(state): State<FeatureState>,
    Path(file_id): Path<String>,
    body: Option<Json<ProcessFileRequest>>,
) -> ApiResult<Response> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let command = CreateJobCommand {
        file_id: parse_id(&file_id, "file")?,
        blob_ref: request.blob_ref,
    };

    let response = create::handle(&state, command).await?;
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}
