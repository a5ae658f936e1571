// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for sketch-to-image generation
//!
//! Fallback-eligible backend failures (`BackendError`) are kept apart from
//! terminal failures so the orchestrator can decide on retries by type.

use thiserror::Error;

use super::backend::BackendError;
use crate::sketch::PreprocessingError;

/// Caller mistakes; never retried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientInputError {
    #[error("File must be an image (content type: {})", .0.as_deref().unwrap_or("none"))]
    UnsupportedContentType(Option<String>),

    #[error("File size {size} exceeds maximum allowed size of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid image file")]
    InvalidImage,

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("prompt must be at most {max} characters, got {len}")]
    PromptTooLong { len: usize, max: usize },

    #[error("negative_prompt must be at most {max} characters, got {len}")]
    NegativePromptTooLong { len: usize, max: usize },

    #[error("{field} must be between {min} and {max}, got {value}")]
    DimensionOutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

impl ClientInputError {
    /// Request field the error refers to
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedContentType(_) | Self::TooLarge { .. } | Self::InvalidImage => {
                Some("sketch")
            }
            Self::EmptyPrompt | Self::PromptTooLong { .. } => Some("prompt"),
            Self::NegativePromptTooLong { .. } => Some("negative_prompt"),
            Self::DimensionOutOfRange { field, .. } => Some(*field),
        }
    }
}

/// Classified outcome of a failed generation
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    ClientInput(#[from] ClientInputError),

    #[error("Stable Diffusion backend is not available")]
    BackendUnavailable,

    #[error("Image generation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to preprocess sketch: {0}")]
    Preprocessing(#[from] PreprocessingError),

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerateError {
    /// Stable snake_case tag for logs and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientInput(_) => "client_input_error",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Backend(e) => e.kind(),
            Self::Preprocessing(_) => "preprocessing_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// HTTP-equivalent status for the failure class
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClientInput(ClientInputError::TooLarge { .. }) => 413,
            Self::ClientInput(_) => 400,
            Self::BackendUnavailable => 503,
            Self::Backend(_) | Self::Preprocessing(_) => 500,
            // Client closed request
            Self::Cancelled => 499,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ClientInput(_))
    }
}
