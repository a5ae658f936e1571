// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod generate_image;
pub mod handlers;
pub mod http_server;

pub use errors::{ApiError, ApiErrorResponse, ErrorResponse};
pub use generate_image::{
    generate_image_handler, test_generate_handler, GenerateImageForm, GenerateImageResponse,
};
pub use handlers::{HealthResponse, ModelsResponse, StylesResponse};
pub use http_server::{create_router, start_server, AppState};
