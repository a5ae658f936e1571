// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Seam between the orchestrator and the image-synthesis backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::payload::GenerationPayload;

/// Failures of a single backend call. All of them are eligible for the
/// prompt-only fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("cannot connect to backend: {0}")]
    ConnectionFailure(String),

    #[error("backend returned status {code}: {body}")]
    NonSuccessStatus { code: u16, body: String },

    #[error("backend returned no images")]
    EmptyResult,
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "backend_timeout",
            Self::ConnectionFailure(_) => "backend_connection_failure",
            Self::NonSuccessStatus { .. } => "backend_bad_status",
            Self::EmptyResult => "backend_empty_result",
        }
    }
}

/// Successful txt2img response, before the orchestrator picks an image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    /// Base64-encoded images as returned by the backend
    pub images: Vec<String>,
    /// Seed the backend actually used, when reported
    pub seed: Option<i64>,
}

impl RawResult {
    pub fn new(images: Vec<String>) -> Self {
        Self { images, seed: None }
    }

    /// First non-empty image, or `EmptyResult`
    pub fn into_first_image(self) -> Result<String, BackendError> {
        self.images
            .into_iter()
            .find(|img| !img.is_empty())
            .ok_or(BackendError::EmptyResult)
    }
}

/// Checkpoint entry reported by `/sdapi/v1/sd-models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendModel {
    pub title: String,
    pub model_name: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Backend reachability, computed fresh on every check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub available: bool,
}

impl BackendHealth {
    pub fn status(&self) -> &'static str {
        if self.available {
            "healthy"
        } else {
            "degraded"
        }
    }
}

/// Image-synthesis backend as seen by the orchestrator
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Short liveness check; false on any failure
    async fn probe(&self) -> bool;

    /// One txt2img call with the full generation timeout
    async fn txt2img(&self, payload: &GenerationPayload) -> Result<RawResult, BackendError>;

    /// Checkpoints the backend can serve
    async fn list_models(&self) -> Result<Vec<BackendModel>, BackendError>;
}
