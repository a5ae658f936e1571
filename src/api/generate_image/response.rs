// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image generation response types

use serde::{Deserialize, Serialize};

use crate::diffusion::{GenerationInfo, GenerationResult};

/// Response from `POST /api/generate-image` and `POST /api/test-generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateImageResponse {
    pub success: bool,
    pub message: String,
    /// Base64-encoded generated image
    pub image_data: Option<String>,
    pub generation_info: Option<GenerationInfo>,
    pub request_id: String,
}

impl GenerateImageResponse {
    pub fn from_result(result: GenerationResult, message: &str, request_id: String) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            image_data: Some(result.image_data),
            generation_info: Some(result.info),
            request_id,
        }
    }
}
