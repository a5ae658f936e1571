// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sketch-to-image generation pipeline with prompt-only fallback
//!
//! Pipeline for `generate`:
//! 1. Validate text fields and the sketch (content type, size, decode)
//! 2. Liveness probe; a dead backend fails fast with `BackendUnavailable`
//! 3. Preprocess the sketch on the blocking pool
//! 4. Conditioned attempt (ControlNet)
//! 5. On any backend failure, exactly one prompt-only attempt whose error is final

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backend::{BackendError, BackendHealth, BackendModel, SynthesisBackend};
use super::errors::{ClientInputError, GenerateError};
use super::payload::{self, GenerationPayload, PayloadVariant};
use super::request::GenerationRequest;
use crate::sketch::{self, PreprocessingError, SketchAsset, SketchInfo};
use crate::styles::{StyleProfile, StyleRegistry};

/// Pipeline stage, used to tag log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Validating,
    Preprocessing,
    AttemptingConditioned,
    AttemptingUnconditioned,
    Done,
    Failed,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Preprocessing => "preprocessing",
            Self::AttemptingConditioned => "attempting_conditioned",
            Self::AttemptingUnconditioned => "attempting_unconditioned",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What was actually sent for the attempt that produced the image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub prompt: String,
    pub negative_prompt: String,
    pub style: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler: String,
    pub width: u32,
    pub height: u32,
    pub conditioning_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl GenerationInfo {
    fn from_payload(payload: &GenerationPayload, style: &str, seed: Option<i64>) -> Self {
        Self {
            prompt: payload.prompt.clone(),
            negative_prompt: payload.negative_prompt.clone(),
            style: style.to_string(),
            steps: payload.steps,
            cfg_scale: payload.cfg_scale,
            sampler: payload.sampler_name.clone(),
            width: payload.width,
            height: payload.height,
            conditioning_used: payload.is_conditioned(),
            seed,
        }
    }
}

/// A generated image; only produced on success
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Base64-encoded image from the backend
    pub image_data: String,
    pub info: GenerationInfo,
}

/// Owns the backend handle and the style registry; cheap to share behind `Arc`
pub struct Orchestrator {
    backend: Arc<dyn SynthesisBackend>,
    styles: Arc<StyleRegistry>,
    max_upload_bytes: usize,
}

/// Prompt prefix for log lines
fn preview(prompt: &str) -> String {
    prompt.chars().take(50).collect()
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        styles: Arc<StyleRegistry>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            backend,
            styles,
            max_upload_bytes,
        }
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Fresh backend reachability check
    pub async fn check_health(&self) -> BackendHealth {
        BackendHealth {
            available: self.backend.probe().await,
        }
    }

    /// Checkpoints reported by the backend
    pub async fn list_models(&self) -> Result<Vec<BackendModel>, GenerateError> {
        self.backend.list_models().await.map_err(|e| {
            warn!("Failed to fetch backend models: {}", e);
            GenerateError::Backend(e)
        })
    }

    /// Full sketch-to-image generation with the prompt-only fallback
    pub async fn generate(
        &self,
        mut request: GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        info!(
            "Generation request: style={}, size={}x{}, sketch={}, prompt={:?}",
            request.style,
            request.width,
            request.height,
            request.sketch.as_ref().map(|s| s.len()).unwrap_or(0),
            preview(&request.prompt)
        );

        let result = self.run(&mut request).await;
        match &result {
            Ok(res) => info!(
                stage = %GenerationStage::Done,
                conditioning_used = res.info.conditioning_used,
                "Image generated for prompt {:?}",
                preview(&request.prompt)
            ),
            Err(e) if e.is_client_error() => warn!(
                stage = %GenerationStage::Failed,
                kind = e.kind(),
                "Generation rejected: {}",
                e
            ),
            Err(e) => error!(
                stage = %GenerationStage::Failed,
                kind = e.kind(),
                "Generation failed: {}",
                e
            ),
        }
        result
    }

    /// `generate`, abandoned as soon as `cancel` fires. In-flight backend
    /// calls are dropped, which aborts the outbound request.
    pub async fn generate_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerateError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Generation cancelled by caller");
                Err(GenerateError::Cancelled)
            }
            result = self.generate(request) => result,
        }
    }

    /// Prompt-only generation at 512x512 for connectivity testing. Skips the
    /// sketch pipeline and the liveness probe.
    pub async fn generate_simple(
        &self,
        prompt: &str,
        style: &str,
    ) -> Result<GenerationResult, GenerateError> {
        let request = GenerationRequest::new(prompt).with_style(style);
        request.validate_prompt()?;

        info!(
            "Simple generation request: style={}, prompt={:?}",
            style,
            preview(prompt)
        );

        let profile = self.styles.resolve(&request.style);
        self.attempt(PayloadVariant::Unconditioned, profile, &request)
            .await
            .map_err(|e| {
                error!(kind = e.kind(), "Simple generation failed: {}", e);
                GenerateError::Backend(e)
            })
    }

    async fn run(
        &self,
        request: &mut GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        debug!(stage = %GenerationStage::Validating, "Validating request");
        request.validate()?;
        if let Some(sketch) = request.sketch.as_mut() {
            sketch.info = Some(self.validate_sketch(sketch).await?);
        }

        if !self.backend.probe().await {
            warn!("Backend liveness probe failed; not attempting generation");
            return Err(GenerateError::BackendUnavailable);
        }

        let profile = self.styles.resolve(&request.style);
        if profile.id != request.style {
            debug!(
                "Unknown style {:?}, using {:?}",
                request.style, profile.id
            );
        }

        if let Some(sketch) = request.sketch.as_ref() {
            debug!(stage = %GenerationStage::Preprocessing, "Preprocessing sketch");
            let sketch_b64 = preprocess_blocking(sketch).await?;
            debug!("Sketch preprocessed, base64 length: {}", sketch_b64.len());

            match self
                .attempt(
                    PayloadVariant::Conditioned {
                        sketch_b64: &sketch_b64,
                    },
                    profile,
                    request,
                )
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => warn!(
                    kind = e.kind(),
                    "Conditioned generation failed, retrying without sketch: {}", e
                ),
            }
        }

        self.attempt(PayloadVariant::Unconditioned, profile, request)
            .await
            .map_err(GenerateError::from)
    }

    async fn validate_sketch(&self, sketch: &SketchAsset) -> Result<SketchInfo, GenerateError> {
        if !sketch::is_image_content_type(sketch.content_type.as_deref()) {
            return Err(ClientInputError::UnsupportedContentType(sketch.content_type.clone()).into());
        }

        if !sketch::is_valid_size(&sketch.bytes, self.max_upload_bytes) {
            return Err(ClientInputError::TooLarge {
                size: sketch.len(),
                max: self.max_upload_bytes,
            }
            .into());
        }

        let bytes = sketch.bytes.clone();
        let info = tokio::task::spawn_blocking(move || sketch::inspect(&bytes))
            .await
            .map_err(|e| PreprocessingError::TaskFailed(e.to_string()))?
            .ok_or(ClientInputError::InvalidImage)?;

        info!(
            "Processing sketch: {}x{} {} {}",
            info.width, info.height, info.mode, info.format
        );
        Ok(info)
    }

    async fn attempt(
        &self,
        variant: PayloadVariant<'_>,
        profile: &StyleProfile,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, BackendError> {
        let stage = match variant {
            PayloadVariant::Conditioned { .. } => GenerationStage::AttemptingConditioned,
            PayloadVariant::Unconditioned => GenerationStage::AttemptingUnconditioned,
        };
        debug!(stage = %stage, style = %profile.id, "Calling backend");

        let payload = payload::build(variant, profile, request);
        let raw = self.backend.txt2img(&payload).await?;
        let seed = raw.seed;
        let image_data = raw.into_first_image()?;

        Ok(GenerationResult {
            image_data,
            info: GenerationInfo::from_payload(&payload, &profile.id, seed),
        })
    }
}

async fn preprocess_blocking(sketch: &SketchAsset) -> Result<String, PreprocessingError> {
    let bytes = sketch.bytes.clone();
    tokio::task::spawn_blocking(move || sketch::preprocess(&bytes))
        .await
        .map_err(|e| PreprocessingError::TaskFailed(e.to_string()))?
}
