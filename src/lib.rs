// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod diffusion;
pub mod sketch;
pub mod styles;
pub mod version;

pub use config::Settings;
pub use diffusion::{
    BackendError, GenerateError, GenerationInfo, GenerationRequest, GenerationResult,
    Orchestrator, SynthesisBackend, WebUiClient,
};
pub use sketch::SketchAsset;
pub use styles::{StyleProfile, StyleRegistry};
