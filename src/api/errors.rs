// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::diffusion::{ClientInputError, GenerateError};

/// Error body. `detail` carries the human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error_type: String,
    pub detail: String,
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    InvalidRequest(String),
    ValidationError {
        field: String,
        message: String,
    },
    /// `size` is unknown when the body limit trips mid-stream
    PayloadTooLarge {
        size: Option<usize>,
        max: usize,
    },
    ServiceUnavailable(String),
    /// Backend failure after the fallback was exhausted
    GenerationFailed {
        kind: &'static str,
        message: String,
    },
    InternalError(String),
    ClientClosed,
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>, expose_details: bool) -> ErrorResponse {
        let (error_type, detail, details) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                ("validation_error", message.clone(), Some(details))
            }
            ApiError::PayloadTooLarge { size, max } => {
                let mut details = HashMap::new();
                if let Some(size) = size {
                    details.insert("size".to_string(), serde_json::Value::Number((*size).into()));
                }
                details.insert(
                    "max_file_size".to_string(),
                    serde_json::Value::Number((*max).into()),
                );
                (
                    "payload_too_large",
                    format!("File size exceeds maximum allowed size of {} bytes", max),
                    Some(details),
                )
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone(), None),
            ApiError::GenerationFailed { kind, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "kind".to_string(),
                    serde_json::Value::String(kind.to_string()),
                );
                let detail = if expose_details {
                    format!("Failed to generate image: {}", message)
                } else {
                    "An unexpected error occurred".to_string()
                };
                ("generation_failed", detail, Some(details))
            }
            ApiError::InternalError(msg) => {
                let detail = if expose_details {
                    msg.clone()
                } else {
                    "An unexpected error occurred".to_string()
                };
                ("internal_error", detail, None)
            }
            ApiError::ClientClosed => ("cancelled", "Request cancelled".to_string(), None),
        };

        ErrorResponse {
            success: false,
            error_type: error_type.to_string(),
            detail,
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) | ApiError::ValidationError { .. } => 400,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::GenerationFailed { .. } | ApiError::InternalError(_) => 500,
            ApiError::ClientClosed => 499,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::PayloadTooLarge {
                size: Some(size),
                max,
            } => write!(f, "Payload of {} bytes exceeds {} bytes", size, max),
            ApiError::PayloadTooLarge { size: None, max } => {
                write!(f, "Payload exceeds {} bytes", max)
            }
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::GenerationFailed { kind, message } => {
                write!(f, "Generation failed ({}): {}", kind, message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ClientClosed => write!(f, "Client closed request"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::ClientInput(ClientInputError::TooLarge { size, max }) => {
                ApiError::PayloadTooLarge {
                    size: Some(size),
                    max,
                }
            }
            GenerateError::ClientInput(input) => ApiError::ValidationError {
                field: input.field().unwrap_or("request").to_string(),
                message: input.to_string(),
            },
            GenerateError::BackendUnavailable => ApiError::ServiceUnavailable(
                "Stable Diffusion WebUI is not available. Please ensure it is running with --api"
                    .to_string(),
            ),
            GenerateError::Backend(e) => ApiError::GenerationFailed {
                kind: e.kind(),
                message: e.to_string(),
            },
            GenerateError::Preprocessing(e) => ApiError::InternalError(e.to_string()),
            GenerateError::Cancelled => ApiError::ClientClosed,
        }
    }
}

/// `ApiError` bound to the request it failed, ready to render
pub struct ApiErrorResponse {
    pub error: ApiError,
    pub request_id: Option<String>,
    pub expose_details: bool,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<ApiError>, request_id: Option<String>, expose_details: bool) -> Self {
        Self {
            error: error.into(),
            request_id,
            expose_details,
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.error.to_response(self.request_id, self.expose_details);

        (status, Json(body)).into_response()
    }
}
