// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image generation endpoint handlers

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use tracing::{info, warn};
use uuid::Uuid;

use super::request::GenerateImageForm;
use super::response::GenerateImageResponse;
use crate::api::errors::ApiErrorResponse;
use crate::api::http_server::AppState;

/// POST /api/generate-image - Generate an image from a sketch and a prompt
///
/// Pipeline:
/// 1. Parse the multipart form (400 on malformed body or missing prompt)
/// 2. Hand off to the orchestrator: validation, liveness gate, preprocessing,
///    conditioned attempt, prompt-only fallback
/// 3. Map the classified outcome to a response
pub async fn generate_image_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<GenerateImageResponse>, ApiErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    let expose = state.settings.debug;

    let form = GenerateImageForm::from_multipart(multipart, state.settings.max_file_size)
        .await
        .map_err(|e| {
            warn!(request_id = %request_id, "Rejected generation form: {}", e);
            ApiErrorResponse::new(e, Some(request_id.clone()), expose)
        })?;

    if let Some(sketch) = &form.sketch {
        info!(
            request_id = %request_id,
            "Received sketch {:?} ({} bytes, {:?})",
            sketch.file_name.as_deref().unwrap_or("unnamed"),
            sketch.bytes.len(),
            sketch.content_type
        );
    }

    let request = form
        .into_generation_request()
        .map_err(|e| ApiErrorResponse::new(e, Some(request_id.clone()), expose))?;

    let result = state
        .orchestrator
        .generate(request)
        .await
        .map_err(|e| ApiErrorResponse::new(e, Some(request_id.clone()), expose))?;

    info!(
        request_id = %request_id,
        conditioning_used = result.info.conditioning_used,
        "Generation request completed"
    );

    Ok(Json(GenerateImageResponse::from_result(
        result,
        "Image generated successfully",
        request_id,
    )))
}

/// POST /api/test-generate - Prompt-only generation without a sketch upload
pub async fn test_generate_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<GenerateImageResponse>, ApiErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    let expose = state.settings.debug;

    let form = GenerateImageForm::from_multipart(multipart, state.settings.max_file_size)
        .await
        .map_err(|e| ApiErrorResponse::new(e, Some(request_id.clone()), expose))?;
    let request = form
        .into_generation_request()
        .map_err(|e| ApiErrorResponse::new(e, Some(request_id.clone()), expose))?;

    let result = state
        .orchestrator
        .generate_simple(&request.prompt, &request.style)
        .await
        .map_err(|e| ApiErrorResponse::new(e, Some(request_id.clone()), expose))?;

    Ok(Json(GenerateImageResponse::from_result(
        result,
        "Test image generated successfully",
        request_id,
    )))
}
