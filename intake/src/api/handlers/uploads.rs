use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use crate::AppState;
use crate::api::models::uploads::UploadResponse;
use crate::errors::{Error, Result};
use crate::store;

#[utoipa::path(
    post,
    path = "/upload",
    tag = "uploads",
    summary = "Upload file",
    description = "Stream a file to disk. The extension must be in the configured allowlist, \
                   the name must not collide with an existing upload, and the received bytes \
                   must stay under the configured cap.",
    request_body(
        content_type = "multipart/form-data",
        description = "Form with a single `file` field carrying the upload"
    ),
    responses(
        (status = 200, description = "File stored", body = crate::api::models::uploads::UploadResponse),
        (status = 400, description = "Unsupported file type or malformed request", body = crate::api::models::uploads::ErrorResponse),
        (status = 409, description = "A file with this name already exists", body = crate::api::models::uploads::ErrorResponse),
        (status = 413, description = "Upload exceeded the size cap", body = crate::api::models::uploads::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::api::models::uploads::ErrorResponse)
    )
)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        // Ignore unknown fields (forward compatibility)
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| Error::BadRequest {
                message: "File field is missing a filename".to_string(),
            })?;

        tracing::debug!(filename = %filename, "starting upload stream processing");

        // The field is a byte stream; the acceptor wants an AsyncRead it can
        // drain in policy-sized chunks.
        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        let stored = store::accept(reader, &filename, &state.config.storage).await?;

        return Ok(Json(UploadResponse::from_stored(&stored)));
    }

    Err(Error::BadRequest {
        message: "Missing required field: 'file'".to_string(),
    })
}
