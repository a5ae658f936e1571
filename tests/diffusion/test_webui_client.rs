// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! WebUiClient against a throwaway axum server standing in for the WebUI

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sketch_render_node::diffusion::payload::{self, PayloadVariant};
use sketch_render_node::diffusion::{
    BackendError, GenerationPayload, GenerationRequest, Orchestrator, SynthesisBackend,
    WebUiClient,
};
use sketch_render_node::styles::StyleRegistry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Address nothing is listening on
async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn client(endpoint: &str) -> WebUiClient {
    WebUiClient::new(endpoint, Duration::from_secs(5)).unwrap()
}

fn prompt_only_payload() -> GenerationPayload {
    let registry = StyleRegistry::builtin();
    payload::build(
        PayloadVariant::Unconditioned,
        registry.resolve("realistic"),
        &GenerationRequest::new("a lighthouse"),
    )
}

#[tokio::test]
async fn test_probe_ok() {
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/options",
        get(|| async { Json(json!({ "sd_model_checkpoint": "v1-5" })) }),
    ))
    .await;
    assert!(client(&endpoint).probe().await);
}

#[tokio::test]
async fn test_probe_non_200_is_down() {
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/options",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    ))
    .await;
    assert!(!client(&endpoint).probe().await);
}

#[tokio::test]
async fn test_probe_unreachable_is_down() {
    let endpoint = dead_endpoint().await;
    assert!(!client(&endpoint).probe().await);
}

#[tokio::test]
async fn test_txt2img_success_parses_seed() {
    let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let recorder = seen.clone();
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/txt2img",
        post(move |Json(body): Json<Value>| {
            let recorder = recorder.clone();
            async move {
                *recorder.lock().unwrap() = Some(body);
                Json(json!({
                    "images": ["aGVsbG8="],
                    "parameters": {},
                    "info": "{\"seed\": 3141592, \"steps\": 30}"
                }))
            }
        }),
    ))
    .await;

    let raw = client(&endpoint)
        .txt2img(&prompt_only_payload())
        .await
        .unwrap();
    assert_eq!(raw.images, vec!["aGVsbG8=".to_string()]);
    assert_eq!(raw.seed, Some(3141592));

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["seed"], -1);
    assert_eq!(body["sampler_name"], "DPM++ 2M Karras");
    assert!(body.get("alwayson_scripts").is_none());
}

#[tokio::test]
async fn test_txt2img_bad_status() {
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/txt2img",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await;

    let err = client(&endpoint)
        .txt2img(&prompt_only_payload())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BackendError::NonSuccessStatus {
            code: 500,
            body: "boom".to_string()
        }
    );
}

/// Raw server that answers 500 with a body cut short of its Content-Length
async fn spawn_truncated_error() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Drain the full request so closing the socket does not reset it
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        let body_len = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_lowercase();
            if let Some(end) = text.find("\r\n\r\n") {
                let declared = text
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                break end + 4 + declared;
            }
        };
        while request.len() < body_len {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        socket
            .write_all(
                b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\nconnection: close\r\n\r\nshort",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_txt2img_bad_status_with_unreadable_body() {
    let endpoint = spawn_truncated_error().await;

    let err = client(&endpoint)
        .txt2img(&prompt_only_payload())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BackendError::NonSuccessStatus {
            code: 500,
            body: String::new()
        }
    );
}

#[tokio::test]
async fn test_txt2img_empty_images() {
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/txt2img",
        post(|| async { Json(json!({ "images": [], "info": "{}" })) }),
    ))
    .await;

    let err = client(&endpoint)
        .txt2img(&prompt_only_payload())
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::EmptyResult);
}

#[tokio::test]
async fn test_txt2img_unreadable_body() {
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/txt2img",
        post(|| async { "<html>proxy error</html>" }),
    ))
    .await;

    let err = client(&endpoint)
        .txt2img(&prompt_only_payload())
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::EmptyResult);
}

#[tokio::test]
async fn test_txt2img_timeout() {
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/txt2img",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "images": ["aGVsbG8="] }))
        }),
    ))
    .await;

    let client = WebUiClient::new(&endpoint, Duration::from_millis(200)).unwrap();
    let err = client.txt2img(&prompt_only_payload()).await.unwrap_err();
    assert_eq!(err, BackendError::Timeout(Duration::from_millis(200)));
}

#[tokio::test]
async fn test_txt2img_connection_refused() {
    let endpoint = dead_endpoint().await;
    let err = client(&endpoint)
        .txt2img(&prompt_only_payload())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::ConnectionFailure(_)));
}

#[tokio::test]
async fn test_list_models() {
    let endpoint = spawn_stub(Router::new().route(
        "/sdapi/v1/sd-models",
        get(|| async {
            Json(json!([
                {
                    "title": "v1-5-pruned-emaonly.safetensors [6ce0161689]",
                    "model_name": "v1-5-pruned-emaonly",
                    "hash": "6ce0161689",
                    "filename": "/models/v1-5-pruned-emaonly.safetensors"
                },
                {
                    "title": "dreamshaper_8.safetensors",
                    "model_name": "dreamshaper_8"
                }
            ]))
        }),
    ))
    .await;

    let models = client(&endpoint).list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[1].model_name, "dreamshaper_8");
    assert!(models[1].hash.is_none());
}

/// Real client and orchestrator: the WebUI rejects the ControlNet call and
/// accepts the prompt-only retry
#[tokio::test]
async fn test_fallback_over_http() {
    let conditioned_calls = Arc::new(AtomicUsize::new(0));
    let plain_calls = Arc::new(AtomicUsize::new(0));
    let (c, p) = (conditioned_calls.clone(), plain_calls.clone());

    let endpoint = spawn_stub(
        Router::new()
            .route("/sdapi/v1/options", get(|| async { Json(json!({})) }))
            .route(
                "/sdapi/v1/txt2img",
                post(move |Json(body): Json<Value>| {
                    let (c, p) = (c.clone(), p.clone());
                    async move {
                        if body.get("alwayson_scripts").is_some() {
                            c.fetch_add(1, Ordering::SeqCst);
                            (
                                StatusCode::INTERNAL_SERVER_ERROR,
                                Json(json!({ "error": "ControlNet not installed" })),
                            )
                        } else {
                            p.fetch_add(1, Ordering::SeqCst);
                            (
                                StatusCode::OK,
                                Json(json!({ "images": ["aGVsbG8="], "info": "{\"seed\": 5}" })),
                            )
                        }
                    }
                }),
            ),
    )
    .await;

    let orchestrator = Orchestrator::new(
        Arc::new(client(&endpoint)),
        Arc::new(StyleRegistry::builtin()),
        10 * 1024 * 1024,
    );

    let mut png = std::io::Cursor::new(Vec::new());
    image::RgbImage::from_pixel(96, 64, image::Rgb([255, 255, 255]))
        .write_to(&mut png, image::ImageFormat::Png)
        .unwrap();
    let request = GenerationRequest::new("a lighthouse").with_sketch(
        sketch_render_node::sketch::SketchAsset::new(png.into_inner(), Some("image/png".into())),
    );

    let result = orchestrator.generate(request).await.unwrap();
    assert!(!result.info.conditioning_used);
    assert_eq!(result.info.seed, Some(5));
    assert_eq!(conditioned_calls.load(Ordering::SeqCst), 1);
    assert_eq!(plain_calls.load(Ordering::SeqCst), 1);
}
