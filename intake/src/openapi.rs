//! OpenAPI documentation for the ingestion API, served at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "intake",
        description = "Streaming file ingestion endpoint with bounded, size-capped uploads"
    ),
    paths(crate::api::handlers::uploads::upload_file),
    components(schemas(
        crate::api::models::uploads::UploadResponse,
        crate::api::models::uploads::ErrorResponse
    )),
    tags((name = "uploads", description = "File ingestion endpoints"))
)]
pub struct ApiDoc;
