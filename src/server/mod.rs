//! HTTP surface
//!
//! `POST /api/compress-video` takes a multipart form and answers with the
//! compressed payload inline as base64. `GET /health` is a liveness probe.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::Serialize;
use tokio::signal;
use tokio::sync::Semaphore;

use crate::app::CompressInteractor;
use crate::domain::errors::CompressionError;
use crate::domain::model::*;
use crate::domain::rules::MEDIA_FIELDS;
use crate::error::VidSqueezeError;

/// Shared handler context
#[derive(Clone)]
pub struct ServerContext {
    pub interactor: Arc<CompressInteractor>,
    /// Bounds concurrent conversions
    pub permits: Arc<Semaphore>,
}

impl ServerContext {
    pub fn new(interactor: Arc<CompressInteractor>, max_concurrent_jobs: usize) -> Self {
        Self {
            interactor,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }
}

/// Success body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResponse {
    pub success: bool,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub encoded_media_base64: String,
    pub duration_seconds: f64,
    pub resolution: String,
    pub format: TargetFormat,
    pub mime_type: &'static str,
    pub strategy: StrategyKind,
}

impl From<&CompressionOutput> for CompressResponse {
    fn from(output: &CompressionOutput) -> Self {
        Self {
            success: true,
            original_size_bytes: output.original_size_bytes,
            compressed_size_bytes: output.compressed_size_bytes,
            encoded_media_base64: base64::engine::general_purpose::STANDARD.encode(&output.media),
            duration_seconds: output.duration_seconds,
            resolution: output.resolution.clone(),
            format: output.format,
            mime_type: output.format.mime_type(),
            strategy: output.strategy,
        }
    }
}

/// Error body `{ "error": ... }` with a status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<CompressionError> for ApiError {
    fn from(err: CompressionError) -> Self {
        if err.is_client_error() {
            tracing::warn!("Rejected submission: {}", err);
        } else {
            tracing::error!("Compression failed: {}", err);
        }
        Self {
            status: StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.public_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Create the Axum router
pub fn create_router(ctx: ServerContext, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/compress-video", post(compress_video))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn compress_video(
    State(ctx): State<ServerContext>,
    mut multipart: Multipart,
) -> Result<Json<CompressResponse>, ApiError> {
    // No upload is buffered without a permit.
    let _permit = ctx.permits.clone().acquire_owned().await.map_err(|_| ApiError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "Server is shutting down".to_string(),
    })?;

    let form = read_form(&mut multipart).await?;

    let output = ctx.interactor.compress_form(&form).await?;
    Ok(Json(CompressResponse::from(&output)))
}

/// Collect text fields and the first media part
async fn read_form(multipart: &mut Multipart) -> Result<FormFields, ApiError> {
    let mut form = FormFields::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError {
        status: e.status(),
        message: e.body_text(),
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if MEDIA_FIELDS.contains(&name.as_str()) {
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(|e| ApiError {
                status: e.status(),
                message: e.body_text(),
            })?;
            if form.media.is_none() {
                form.media = Some(data);
                form.file_name = file_name;
            }
        } else {
            let value = field.text().await.map_err(|e| ApiError {
                status: e.status(),
                message: e.body_text(),
            })?;
            form.fields.entry(name).or_insert(value);
        }
    }

    Ok(form)
}

/// Start the HTTP server and run until a shutdown signal
pub async fn start_server(ctx: ServerContext, bind: &str, max_upload_bytes: usize) -> Result<(), VidSqueezeError> {
    let app = create_router(ctx, max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| VidSqueezeError::Bind {
            addr: bind.to_string(),
            source,
        })?;
    tracing::info!("Listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| VidSqueezeError::Server(e.to_string()))?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
