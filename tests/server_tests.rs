//! HTTP surface tests
//!
//! Drives the router with `tower::ServiceExt::oneshot` and mock strategies.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use base64::Engine as _;
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

use vidsqueeze::app::{CompressInteractor, FallbackController};
use vidsqueeze::domain::errors::{CompressionError, FailureCause, GENERIC_FAILURE_MESSAGE};
use vidsqueeze::domain::model::*;
use vidsqueeze::planner::CommandPlan;
use vidsqueeze::ports::{Availability, ExecutePort};
use vidsqueeze::server::{create_router, ServerContext};

const BOUNDARY: &str = "vidsqueeze-test-boundary";

struct MockStrategy {
    kind: StrategyKind,
    succeed: bool,
    calls: AtomicUsize,
}

impl MockStrategy {
    fn new(kind: StrategyKind, succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            succeed,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ExecutePort for MockStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn supports_acceleration(&self) -> bool {
        false
    }

    async fn execute(&self, plan: &CommandPlan, _media: Bytes) -> Result<ExecutionOutcome, CompressionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(ExecutionOutcome::new(Bytes::from(format!("encoded-{}", plan.format))))
        } else {
            Err(CompressionError::execution_failed(
                self.kind,
                FailureCause::EncoderExit { code: Some(1) },
                "mock failure",
            ))
        }
    }

    async fn probe_availability(&self) -> Availability {
        Availability::available("mock")
    }
}

fn router(strategies: Vec<Arc<dyn ExecutePort>>, max_upload_bytes: usize) -> axum::Router {
    let controller = Arc::new(FallbackController::new(strategies));
    let interactor = Arc::new(CompressInteractor::new(controller, None));
    create_router(ServerContext::new(interactor, 2), max_upload_bytes)
}

/// Build a multipart body from text fields and an optional file part
fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"clip.mov\"\r\nContent-Type: video/quicktime\r\n\r\n",
                BOUNDARY, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn compress_request(body: Vec<u8>) -> Request<Body> {
    Request::post("/api/compress-video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = router(Vec::new(), 1024);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response.into_body()).await, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn test_successful_compression_response() {
    let local = MockStrategy::new(StrategyKind::Local, true);
    let app = router(vec![local.clone()], 1024 * 1024);

    let payload = vec![9u8; 2000];
    let body = multipart_body(
        &[("format", "webm"), ("bitrate", "800"), ("removeAudio", "true")],
        Some(("video", &payload)),
    );
    let response = app.oneshot(compress_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["originalSizeBytes"], 2000);
    assert_eq!(json["compressedSizeBytes"], "encoded-webm".len());
    assert_eq!(json["durationSeconds"], 0.0);
    assert_eq!(json["resolution"], "N/A");
    assert_eq!(json["format"], "webm");
    assert_eq!(json["mimeType"], "video/webm");
    assert_eq!(json["strategy"], "local");

    let encoded = json["encodedMediaBase64"].as_str().unwrap();
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
    assert_eq!(decoded, b"encoded-webm");
    assert_eq!(local.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_alternate_media_field_accepted() {
    let app = router(vec![MockStrategy::new(StrategyKind::Local, true)], 1024 * 1024);
    let body = multipart_body(&[], Some(("file", b"abc")));
    let response = app.oneshot(compress_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_video_is_400() {
    let local = MockStrategy::new(StrategyKind::Local, true);
    let app = router(vec![local.clone()], 1024 * 1024);

    let body = multipart_body(&[("format", "mp4")], None);
    let response = app.oneshot(compress_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response.into_body()).await,
        serde_json::json!({"error": "No video file provided"})
    );
    assert_eq!(local.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_format_is_400() {
    let local = MockStrategy::new(StrategyKind::Local, true);
    let app = router(vec![local.clone()], 1024 * 1024);

    let body = multipart_body(&[("format", "invalidformat")], Some(("video", b"abc")));
    let response = app.oneshot(compress_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response.into_body()).await,
        serde_json::json!({"error": "Invalid output format"})
    );
    assert_eq!(local.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exhaustion_is_500_with_generic_message() {
    let app = router(
        vec![
            MockStrategy::new(StrategyKind::Local, false),
            MockStrategy::new(StrategyKind::Sandboxed, false),
        ],
        1024 * 1024,
    );

    let body = multipart_body(&[], Some(("video", b"abc")));
    let response = app.oneshot(compress_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response.into_body()).await,
        serde_json::json!({"error": GENERIC_FAILURE_MESSAGE})
    );
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let local = MockStrategy::new(StrategyKind::Local, true);
    let app = router(vec![local.clone()], 512);

    let payload = vec![1u8; 4096];
    let body = multipart_body(&[], Some(("video", &payload)));
    let response = app.oneshot(compress_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(local.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_upload_not_read_until_a_job_slot_frees() {
    let local = MockStrategy::new(StrategyKind::Local, true);
    let controller = Arc::new(FallbackController::new(vec![local.clone() as Arc<dyn ExecutePort>]));
    let ctx = ServerContext::new(Arc::new(CompressInteractor::new(controller, None)), 1);
    let busy = ctx.permits.clone().acquire_owned().await.unwrap();
    let app = create_router(ctx, 1024 * 1024);

    let read = Arc::new(AtomicBool::new(false));
    let flag = read.clone();
    let payload = multipart_body(&[], Some(("video", b"abc")));
    let stream = futures::stream::once(async move {
        flag.store(true, Ordering::SeqCst);
        Ok::<_, std::io::Error>(Bytes::from(payload))
    });
    let request = Request::post("/api/compress-video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from_stream(stream))
        .unwrap();

    let pending = tokio::spawn(app.oneshot(request));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!read.load(Ordering::SeqCst));
    assert_eq!(local.calls.load(Ordering::SeqCst), 0);

    drop(busy);
    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read.load(Ordering::SeqCst));
    assert_eq!(local.calls.load(Ordering::SeqCst), 1);
}
