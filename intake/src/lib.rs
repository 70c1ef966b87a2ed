//! intake - a streaming file ingestion server.
//!
//! Clients POST a file as `multipart/form-data` to `/upload`; the server
//! validates the extension against an allowlist, streams the bytes to disk
//! in bounded chunks while enforcing a total-size cap, and reports the
//! stored size in megabytes. Oversized or failed uploads never leave a
//! partial file behind.
//!
//! The crate is organized as:
//! - [`config`]: YAML + environment configuration ([`Config`], the storage policy)
//! - [`store`]: the upload acceptor (validation, bounded copy, cleanup)
//! - [`api`]: axum handlers and response models
//! - [`telemetry`]: tracing initialization
//!
//! [`Application`] ties these together: `Application::new(config)` prepares
//! the storage directory and router, `serve(shutdown)` runs the server with
//! graceful shutdown.

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod store;
pub mod telemetry;

pub use config::Config;

use crate::config::CorsOrigin;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// The configuration is the only shared resource; it is read-only after
/// startup, so concurrent uploads never contend on it.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.cors.allow_credentials)
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `POST /upload`: the ingestion endpoint, with a transport body limit
///   sized above the acceptor's cap so the acceptor's received-byte count
///   is what decides oversize rejections
/// - `GET /`: readiness message
/// - `GET /healthz`: liveness probe
/// - `GET /docs`: generated API documentation
/// - CORS and tracing middleware
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    // Multipart framing overhead must not trip the transport limit before
    // the acceptor's own cap fires; give it headroom.
    let upload_body_limit = state.config.storage.max_file_size as usize + 1024 * 1024;

    let upload_router = Router::new().route(
        "/upload",
        post(api::handlers::uploads::upload_file).layer(DefaultBodyLimit::max(upload_body_limit)),
    );

    let router = Router::new()
        .route("/", get(root))
        .route("/healthz", get(|| async { "OK" }))
        .merge(upload_router)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", openapi::ApiDoc::openapi()));

    // Create CORS layer from config
    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer);

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Root endpoint: simple message showing the endpoints are working.
async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Upload backend ready" }))
}

/// The assembled server: configuration plus the ready-to-serve router.
///
/// 1. **Create**: [`Application::new`] validates the storage directory and
///    builds the router
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting intake with configuration: {:#?}", config);

        // The storage directory must exist before the first accept
        store::ensure_storage_dir(&config.storage)
            .await
            .with_context(|| format!("Failed to create storage directory {}", config.storage.dir.display()))?;

        let state = AppState { config: config.clone() };
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Intake listening on http://{}, accepting uploads into {}",
            bind_addr,
            self.config.storage.dir.display()
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::models::uploads::UploadResponse;
    use crate::store::to_megabytes;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use axum_test::multipart::{MultipartForm, Part};
    use tempfile::TempDir;

    async fn test_server_with(update: impl FnOnce(&mut Config)) -> (TestServer, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.dir = dir.path().to_path_buf();
        update(&mut config);

        let app = Application::new(config).await.expect("Failed to build application");
        (app.into_test_server(), dir)
    }

    async fn test_server() -> (TestServer, TempDir) {
        test_server_with(|_| {}).await
    }

    fn upload_form(content: &[u8], filename: &str) -> MultipartForm {
        MultipartForm::new().add_part("file", Part::bytes(content.to_vec()).file_name(filename.to_string()))
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_stores_file_and_reports_size() {
        let (server, dir) = test_server().await;
        let content = b"id,value\n1,hello\n2,world\n";

        let response = server.post("/upload").multipart(upload_form(content, "data.csv")).await;

        response.assert_status(StatusCode::OK);
        let body: UploadResponse = response.json();
        assert_eq!(body.filename, "data.csv");
        assert_eq!(body.size, to_megabytes(content.len() as u64));

        let on_disk = std::fs::read(dir.path().join("data.csv")).unwrap();
        assert_eq!(on_disk, content);
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_rejects_unsupported_type() {
        let (server, dir) = test_server().await;

        let response = server.post("/upload").multipart(upload_form(b"MZ", "tool.exe")).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["detail"].as_str().unwrap().contains(".exe"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_conflict_on_duplicate_name() {
        let (server, _dir) = test_server().await;

        let first = server.post("/upload").multipart(upload_form(b"one", "dup.txt")).await;
        first.assert_status(StatusCode::OK);

        let second = server.post("/upload").multipart(upload_form(b"two", "dup.txt")).await;
        second.assert_status(StatusCode::CONFLICT);
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_oversize_rejected_and_cleaned_up() {
        let (server, dir) = test_server_with(|config| {
            config.storage.max_file_size = 16;
            config.storage.chunk_size = 8;
        })
        .await;

        let response = server.post("/upload").multipart(upload_form(&[0u8; 64], "big.csv")).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!dir.path().join("big.csv").exists());
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_requires_file_field() {
        let (server, _dir) = test_server().await;

        let form = MultipartForm::new().add_text("note", "no file here");
        let response = server.post("/upload").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_sanitizes_traversal_names() {
        let (server, dir) = test_server().await;

        let response = server
            .post("/upload")
            .multipart(upload_form(b"data", "../../etc/secrets.csv"))
            .await;

        response.assert_status(StatusCode::OK);
        let body: UploadResponse = response.json();
        assert_eq!(body.filename, "secrets.csv");
        assert!(dir.path().join("secrets.csv").exists());
    }

    #[test_log::test(tokio::test)]
    async fn test_root_reports_ready() {
        let (server, _dir) = test_server().await;

        let response = server.get("/").await;

        response.assert_status(StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Upload backend ready");
    }

    #[test_log::test(tokio::test)]
    async fn test_healthz() {
        let (server, _dir) = test_server().await;

        let response = server.get("/healthz").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.text(), "OK");
    }
}
