// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Sketch Render Node

/// Service name reported by the root endpoint
pub const SERVICE_NAME: &str = "Sketch to Reality API";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "sketch-conditioning",
    "controlnet-canny",
    "prompt-only-fallback",
    "style-profiles",
    "liveness-gate",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("{} {}", SERVICE_NAME, VERSION_NUMBER)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "message": SERVICE_NAME,
        "version": VERSION_NUMBER,
        "status": "running",
        "features": FEATURES,
    })
}
