// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Uploaded sketch handling
//!
//! A `SketchAsset` lives for exactly one generation request. The preprocessor
//! turns its bytes into the base64 JPEG the backend's ControlNet unit expects.

pub mod preprocessor;

pub use preprocessor::{
    detect_format, inspect, is_image_content_type, is_valid_size, preprocess, validate,
    PreprocessingError, SketchInfo, JPEG_QUALITY, MAX_SKETCH_DIMENSION,
};

use bytes::Bytes;

/// Raw sketch upload plus what we learned about it during validation
#[derive(Debug, Clone)]
pub struct SketchAsset {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub info: Option<SketchInfo>,
}

impl SketchAsset {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
            info: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
