// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sketch-conditioned image generation against a Stable Diffusion WebUI backend

pub mod backend;
pub mod client;
pub mod errors;
pub mod orchestrator;
pub mod payload;
pub mod request;

pub use backend::{BackendError, BackendHealth, BackendModel, RawResult, SynthesisBackend};
pub use client::WebUiClient;
pub use errors::{ClientInputError, GenerateError};
pub use orchestrator::{GenerationInfo, GenerationResult, GenerationStage, Orchestrator};
pub use payload::{GenerationPayload, PayloadVariant};
pub use request::GenerationRequest;
