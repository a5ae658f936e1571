// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multipart form parsing for the generation endpoints

use axum::http::StatusCode;
use axum_extra::extract::multipart::MultipartError;
use axum_extra::extract::Multipart;
use bytes::Bytes;

use crate::api::errors::ApiError;
use crate::diffusion::GenerationRequest;
use crate::sketch::SketchAsset;
use crate::styles::DEFAULT_STYLE;

/// Fields of `POST /api/generate-image` and `POST /api/test-generate`
#[derive(Debug, Clone, Default)]
pub struct GenerateImageForm {
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sketch: Option<SketchUpload>,
}

#[derive(Debug, Clone)]
pub struct SketchUpload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

/// A body that trips the request limit mid-stream is still an oversized upload
fn bad_multipart(err: MultipartError, max_upload: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge {
            size: None,
            max: max_upload,
        };
    }
    ApiError::InvalidRequest(format!("Malformed multipart body: {}", err.body_text()))
}

/// Blank form values are treated as absent
fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_dimension(field: &str, value: String) -> Result<Option<u32>, ApiError> {
    match non_blank(value) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ApiError::ValidationError {
                field: field.to_string(),
                message: format!("{} must be an integer, got {:?}", field, raw),
            }),
    }
}

impl GenerateImageForm {
    /// Read every field of the multipart body. Unknown fields are skipped.
    /// `max_upload` is reported back when the body exceeds the request limit.
    pub async fn from_multipart(
        mut multipart: Multipart,
        max_upload: usize,
    ) -> Result<Self, ApiError> {
        let mut form = Self::default();
        let bad = |err: MultipartError| bad_multipart(err, max_upload);

        while let Some(field) = multipart.next_field().await.map_err(bad)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "sketch" => {
                    let content_type = field.content_type().map(str::to_string);
                    let file_name = field.file_name().map(str::to_string);
                    let bytes = field.bytes().await.map_err(bad)?;
                    form.sketch = Some(SketchUpload {
                        bytes,
                        content_type,
                        file_name,
                    });
                }
                "prompt" => form.prompt = Some(field.text().await.map_err(bad)?),
                "style" => form.style = non_blank(field.text().await.map_err(bad)?),
                "negative_prompt" => {
                    form.negative_prompt = non_blank(field.text().await.map_err(bad)?)
                }
                "width" => {
                    form.width = parse_dimension("width", field.text().await.map_err(bad)?)?
                }
                "height" => {
                    form.height =
                        parse_dimension("height", field.text().await.map_err(bad)?)?
                }
                _ => {}
            }
        }

        Ok(form)
    }

    /// Convert into an orchestrator request; only presence is checked here
    pub fn into_generation_request(self) -> Result<GenerationRequest, ApiError> {
        let prompt = self.prompt.ok_or_else(|| ApiError::ValidationError {
            field: "prompt".to_string(),
            message: "prompt is required".to_string(),
        })?;

        let mut request =
            GenerationRequest::new(prompt).with_style(self.style.as_deref().unwrap_or(DEFAULT_STYLE));
        request.negative_prompt = self.negative_prompt;
        if let Some(width) = self.width {
            request.width = width;
        }
        if let Some(height) = self.height {
            request.height = height;
        }
        if let Some(upload) = self.sketch {
            request = request.with_sketch(SketchAsset::new(upload.bytes, upload.content_type));
        }
        Ok(request)
    }
}
