// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Orchestrator state machine: liveness gate, conditioned attempt, prompt-only fallback

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};
use mockall::{mock, Sequence};
use sketch_render_node::diffusion::{
    BackendError, BackendModel, ClientInputError, GenerateError, GenerationPayload,
    GenerationRequest, Orchestrator, RawResult, SynthesisBackend,
};
use sketch_render_node::sketch::SketchAsset;
use sketch_render_node::styles::StyleRegistry;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mock! {
    pub Backend {}

    #[async_trait]
    impl SynthesisBackend for Backend {
        async fn probe(&self) -> bool;
        async fn txt2img(&self, payload: &GenerationPayload) -> Result<RawResult, BackendError>;
        async fn list_models(&self) -> Result<Vec<BackendModel>, BackendError>;
    }
}

const MAX_UPLOAD: usize = 10 * 1024 * 1024;

fn orchestrator(backend: MockBackend) -> Orchestrator {
    Orchestrator::new(
        Arc::new(backend),
        Arc::new(StyleRegistry::builtin()),
        MAX_UPLOAD,
    )
}

/// White canvas with a dark diagonal stroke, encoded as PNG
fn sketch_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    for i in 0..width.min(height) {
        img.put_pixel(i, i, Rgba([0, 0, 0, 255]));
    }
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn png_asset(width: u32, height: u32) -> SketchAsset {
    SketchAsset::new(sketch_png(width, height), Some("image/png".to_string()))
}

fn image_result(seed: Option<i64>) -> RawResult {
    RawResult {
        images: vec!["Z2VuZXJhdGVk".to_string()],
        seed,
    }
}

#[tokio::test]
async fn test_dead_backend_fails_fast() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| false);
    backend.expect_txt2img().times(0);

    let request = GenerationRequest::new("a lighthouse").with_sketch(png_asset(64, 64));
    let err = orchestrator(backend).generate(request).await.unwrap_err();

    assert!(matches!(err, GenerateError::BackendUnavailable));
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn test_conditioned_failure_triggers_exactly_one_fallback() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    backend
        .expect_probe()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| true);
    backend
        .expect_txt2img()
        .withf(|payload| payload.is_conditioned())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Err(BackendError::NonSuccessStatus {
                code: 500,
                body: "ControlNet model missing".to_string(),
            })
        });
    backend
        .expect_txt2img()
        .withf(|payload| !payload.is_conditioned())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(image_result(None)));

    let request = GenerationRequest::new("a lighthouse").with_sketch(png_asset(64, 64));
    let result = orchestrator(backend).generate(request).await.unwrap();

    assert_eq!(result.image_data, "Z2VuZXJhdGVk");
    assert!(!result.info.conditioning_used);
}

#[tokio::test]
async fn test_conditioned_success_skips_fallback() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| true);
    backend
        .expect_txt2img()
        .withf(|payload| payload.is_conditioned())
        .times(1)
        .returning(|_| Ok(image_result(Some(1234))));
    backend
        .expect_txt2img()
        .withf(|payload| !payload.is_conditioned())
        .times(0);

    let request = GenerationRequest::new("a lighthouse").with_sketch(png_asset(64, 64));
    let result = orchestrator(backend).generate(request).await.unwrap();

    assert!(result.info.conditioning_used);
    assert_eq!(result.info.seed, Some(1234));
}

#[tokio::test]
async fn test_anime_sketch_end_to_end() {
    let sent: Arc<Mutex<Vec<GenerationPayload>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = sent.clone();

    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| true);
    backend.expect_txt2img().times(1).returning(move |payload| {
        captured.lock().unwrap().push(payload.clone());
        Ok(image_result(None))
    });

    let request = GenerationRequest::new("a red fox")
        .with_style("anime")
        .with_sketch(png_asset(800, 600));
    let result = orchestrator(backend).generate(request).await.unwrap();

    assert!(result.info.conditioning_used);
    assert_eq!(result.info.style, "anime");
    assert_eq!(result.info.steps, 28);
    assert_eq!(result.info.sampler, "DPM++ SDE Karras");
    assert_eq!((result.info.width, result.info.height), (512, 512));

    let sent = sent.lock().unwrap();
    let payload = &sent[0];
    assert_eq!(
        payload.prompt,
        "a red fox, anime style, manga, cel shading, vibrant colors, detailed"
    );
    assert!((payload.cfg_scale - 8.5).abs() < f32::EPSILON);

    let unit = payload.conditioning().unwrap();
    assert!((unit.weight - 0.9).abs() < f32::EPSILON);

    // 800x600 is shrunk to fit 512 with the aspect ratio kept
    let jpeg = STANDARD.decode(&unit.input_image).unwrap();
    let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
    assert_eq!(decoded.dimensions(), (512, 384));
}

#[tokio::test]
async fn test_empty_conditioned_result_falls_back() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| true);
    backend
        .expect_txt2img()
        .withf(|payload| payload.is_conditioned())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(RawResult::new(Vec::new())));
    backend
        .expect_txt2img()
        .withf(|payload| !payload.is_conditioned())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|payload| {
            assert!(payload.alwayson_scripts.is_none());
            Ok(image_result(None))
        });

    let request = GenerationRequest::new("a lighthouse").with_sketch(png_asset(64, 64));
    let result = orchestrator(backend).generate(request).await.unwrap();

    assert!(!result.info.conditioning_used);
}

#[tokio::test]
async fn test_oversized_upload_never_reaches_backend() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(0);
    backend.expect_txt2img().times(0);

    let orchestrator = Orchestrator::new(
        Arc::new(backend),
        Arc::new(StyleRegistry::builtin()),
        1024,
    );
    let request = GenerationRequest::new("a lighthouse").with_sketch(SketchAsset::new(
        vec![0u8; 2048],
        Some("image/png".to_string()),
    ));
    let err = orchestrator.generate(request).await.unwrap_err();

    assert!(matches!(
        err,
        GenerateError::ClientInput(ClientInputError::TooLarge {
            size: 2048,
            max: 1024
        })
    ));
    assert_eq!(err.status_code(), 413);
}

#[tokio::test]
async fn test_both_attempts_fail_returns_fallback_error() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| true);
    backend
        .expect_txt2img()
        .withf(|payload| payload.is_conditioned())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(BackendError::Timeout(Duration::from_secs(300))));
    backend
        .expect_txt2img()
        .withf(|payload| !payload.is_conditioned())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Err(BackendError::NonSuccessStatus {
                code: 500,
                body: "out of memory".to_string(),
            })
        });

    let request = GenerationRequest::new("a lighthouse").with_sketch(png_asset(64, 64));
    let err = orchestrator(backend).generate(request).await.unwrap_err();

    match &err {
        GenerateError::Backend(BackendError::NonSuccessStatus { code, body }) => {
            assert_eq!(*code, 500);
            assert_eq!(body, "out of memory");
        }
        other => panic!("expected the fallback error, got {:?}", other),
    }
    assert_eq!(err.kind(), "backend_bad_status");
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_non_image_upload_rejected() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(0);
    backend.expect_txt2img().times(0);

    let request = GenerationRequest::new("a lighthouse").with_sketch(SketchAsset::new(
        sketch_png(32, 32),
        Some("text/plain".to_string()),
    ));
    let err = orchestrator(backend).generate(request).await.unwrap_err();

    assert!(matches!(
        err,
        GenerateError::ClientInput(ClientInputError::UnsupportedContentType(_))
    ));
}

#[tokio::test]
async fn test_corrupt_image_rejected() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(0);
    backend.expect_txt2img().times(0);

    let mut bytes = sketch_png(32, 32);
    bytes.truncate(40);
    let request = GenerationRequest::new("a lighthouse")
        .with_sketch(SketchAsset::new(bytes, Some("image/png".to_string())));
    let err = orchestrator(backend).generate(request).await.unwrap_err();

    assert!(matches!(
        err,
        GenerateError::ClientInput(ClientInputError::InvalidImage)
    ));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_invalid_text_fields_rejected_before_probe() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(0);
    backend.expect_txt2img().times(0);
    let orchestrator = orchestrator(backend);

    let err = orchestrator
        .generate(GenerationRequest::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerateError::ClientInput(ClientInputError::EmptyPrompt)
    ));

    let err = orchestrator
        .generate(GenerationRequest::new("a lighthouse").with_size(4096, 512))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerateError::ClientInput(ClientInputError::DimensionOutOfRange { field: "width", .. })
    ));
}

#[tokio::test]
async fn test_request_without_sketch_goes_prompt_only() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| true);
    backend
        .expect_txt2img()
        .withf(|payload| !payload.is_conditioned())
        .times(1)
        .returning(|_| Ok(image_result(None)));

    let result = orchestrator(backend)
        .generate(GenerationRequest::new("a lighthouse").with_size(768, 512))
        .await
        .unwrap();

    assert!(!result.info.conditioning_used);
    assert_eq!((result.info.width, result.info.height), (768, 512));
}

#[tokio::test]
async fn test_unknown_style_uses_default_profile() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| true);
    backend
        .expect_txt2img()
        .withf(|payload| payload.sampler_name == "DPM++ 2M Karras" && payload.steps == 30)
        .times(1)
        .returning(|_| Ok(image_result(None)));

    let result = orchestrator(backend)
        .generate(GenerationRequest::new("a lighthouse").with_style("vaporwave"))
        .await
        .unwrap();

    assert_eq!(result.info.style, "realistic");
    assert!(result.info.prompt.starts_with("a lighthouse, photorealistic"));
}

#[tokio::test]
async fn test_generate_simple_skips_probe() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(0);
    backend
        .expect_txt2img()
        .withf(|payload| {
            !payload.is_conditioned() && payload.width == 512 && payload.height == 512
        })
        .times(1)
        .returning(|_| Ok(image_result(Some(7))));

    let result = orchestrator(backend)
        .generate_simple("a lighthouse", "watercolor")
        .await
        .unwrap();

    assert_eq!(result.info.style, "watercolor");
    assert_eq!(result.info.seed, Some(7));
}

#[tokio::test]
async fn test_generate_simple_surfaces_backend_error() {
    let mut backend = MockBackend::new();
    backend
        .expect_txt2img()
        .times(1)
        .returning(|_| Err(BackendError::ConnectionFailure("refused".to_string())));

    let err = orchestrator(backend)
        .generate_simple("a lighthouse", "realistic")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "backend_connection_failure");
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(0);
    backend.expect_txt2img().times(0);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(backend)
        .generate_with_cancel(GenerationRequest::new("a lighthouse"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GenerateError::Cancelled));
}

#[tokio::test]
async fn test_generate_with_cancel_completes_when_not_cancelled() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| true);
    backend
        .expect_txt2img()
        .times(1)
        .returning(|_| Ok(image_result(None)));

    let cancel = CancellationToken::new();
    let result = orchestrator(backend)
        .generate_with_cancel(GenerationRequest::new("a lighthouse"), &cancel)
        .await
        .unwrap();
    assert_eq!(result.image_data, "Z2VuZXJhdGVk");
}

/// Live backend whose generation call outlasts any test
struct StalledBackend {
    entered: tokio::sync::Notify,
}

#[async_trait]
impl SynthesisBackend for StalledBackend {
    async fn probe(&self) -> bool {
        true
    }

    async fn txt2img(&self, _payload: &GenerationPayload) -> Result<RawResult, BackendError> {
        self.entered.notify_one();
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(image_result(None))
    }

    async fn list_models(&self) -> Result<Vec<BackendModel>, BackendError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_cancel_drops_in_flight_generation() {
    let backend = Arc::new(StalledBackend {
        entered: tokio::sync::Notify::new(),
    });
    let orchestrator = Orchestrator::new(
        backend.clone(),
        Arc::new(StyleRegistry::builtin()),
        MAX_UPLOAD,
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = backend.clone();
    tokio::spawn(async move {
        watcher.entered.notified().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let request = GenerationRequest::new("a lighthouse").with_sketch(png_asset(64, 64));
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.generate_with_cancel(request, &cancel),
    )
    .await
    .expect("cancellation did not interrupt the backend call")
    .unwrap_err();

    assert!(matches!(err, GenerateError::Cancelled));
    assert_eq!(err.status_code(), 499);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_health_and_models_pass_through() {
    let mut backend = MockBackend::new();
    backend.expect_probe().times(1).returning(|| false);
    backend.expect_list_models().times(1).returning(|| {
        Ok(vec![BackendModel {
            title: "v1-5-pruned-emaonly.safetensors [6ce0161689]".to_string(),
            model_name: "v1-5-pruned-emaonly".to_string(),
            hash: Some("6ce0161689".to_string()),
            filename: None,
        }])
    });
    let orchestrator = orchestrator(backend);

    let health = orchestrator.check_health().await;
    assert!(!health.available);
    assert_eq!(health.status(), "degraded");

    let models = orchestrator.list_models().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].model_name, "v1-5-pruned-emaonly");
}
