// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image generation API endpoint module
//!
//! Provides POST /api/generate-image (sketch + prompt) and
//! POST /api/test-generate (prompt only).

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{generate_image_handler, test_generate_handler};
pub use request::{GenerateImageForm, SketchUpload};
pub use response::GenerateImageResponse;
