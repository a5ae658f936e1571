// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! txt2img payload construction for the Stable Diffusion WebUI API
//!
//! Both variants share every field except the ControlNet block under
//! `alwayson_scripts`. The ControlNet unit settings are fixed policy.

use serde::{Serialize, Serializer};

use super::request::GenerationRequest;
use crate::styles::StyleProfile;

/// ControlNet checkpoint used for sketch conditioning
pub const CONTROLNET_MODEL: &str = "control_v11p_sd15_canny [d14c016b]";

/// ControlNet preprocessor (edge extraction)
pub const CONTROLNET_MODULE: &str = "canny";

/// Canny low/high thresholds
pub const CANNY_THRESHOLD_LOW: u32 = 100;
pub const CANNY_THRESHOLD_HIGH: u32 = 200;

/// Which payload shape to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadVariant<'a> {
    /// Conditioned on the preprocessed (base64 JPEG) sketch
    Conditioned { sketch_b64: &'a str },
    /// Prompt only
    Unconditioned,
}

/// ControlNet control mode, sent as its integer index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Balanced = 0,
    PromptPriority = 1,
    ControlNetPriority = 2,
}

impl Serialize for ControlMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// ControlNet resize mode, sent as its integer index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    JustResize = 0,
    CropAndResize = 1,
    ResizeAndFill = 2,
}

impl Serialize for ResizeMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// One ControlNet unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlNetUnit {
    pub input_image: String,
    pub model: String,
    pub module: String,
    pub weight: f32,
    pub guidance_start: f32,
    pub guidance_end: f32,
    pub control_mode: ControlMode,
    pub resize_mode: ResizeMode,
    pub pixel_perfect: bool,
    pub threshold_a: u32,
    pub threshold_b: u32,
    pub enabled: bool,
}

impl ControlNetUnit {
    /// Canny unit over the full denoising range with the fixed policy settings
    pub fn canny(sketch_b64: &str, weight: f32) -> Self {
        Self {
            input_image: sketch_b64.to_string(),
            model: CONTROLNET_MODEL.to_string(),
            module: CONTROLNET_MODULE.to_string(),
            weight,
            guidance_start: 0.0,
            guidance_end: 1.0,
            control_mode: ControlMode::Balanced,
            resize_mode: ResizeMode::CropAndResize,
            pixel_perfect: false,
            threshold_a: CANNY_THRESHOLD_LOW,
            threshold_b: CANNY_THRESHOLD_HIGH,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlNetArgs {
    pub args: Vec<ControlNetUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlwaysOnScripts {
    pub controlnet: ControlNetArgs,
}

/// Body of `POST /sdapi/v1/txt2img`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationPayload {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    pub batch_size: u32,
    pub n_iter: u32,
    /// -1 lets the backend pick a random seed
    pub seed: i64,
    pub restore_faces: bool,
    pub tiling: bool,
    pub do_not_save_samples: bool,
    pub do_not_save_grid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alwayson_scripts: Option<AlwaysOnScripts>,
}

impl GenerationPayload {
    /// The ControlNet unit, present only in the conditioned variant
    pub fn conditioning(&self) -> Option<&ControlNetUnit> {
        self.alwayson_scripts
            .as_ref()
            .and_then(|scripts| scripts.controlnet.args.first())
    }

    pub fn is_conditioned(&self) -> bool {
        self.conditioning().is_some()
    }
}

/// `user_prompt + suffix`
pub fn resolve_prompt(user_prompt: &str, profile: &StyleProfile) -> String {
    format!("{}{}", user_prompt, profile.prompt_suffix)
}

/// `user_negative + ", " + profile negative`, or just the profile negative
pub fn resolve_negative_prompt(user_negative: Option<&str>, profile: &StyleProfile) -> String {
    match user_negative {
        Some(neg) => format!("{}, {}", neg, profile.negative_prompt),
        None => profile.negative_prompt.clone(),
    }
}

/// Build the backend payload for one attempt. Pure; inputs are assumed validated.
pub fn build(
    variant: PayloadVariant<'_>,
    profile: &StyleProfile,
    request: &GenerationRequest,
) -> GenerationPayload {
    let alwayson_scripts = match variant {
        PayloadVariant::Conditioned { sketch_b64 } => Some(AlwaysOnScripts {
            controlnet: ControlNetArgs {
                args: vec![ControlNetUnit::canny(
                    sketch_b64,
                    profile.conditioning_strength,
                )],
            },
        }),
        PayloadVariant::Unconditioned => None,
    };

    GenerationPayload {
        prompt: resolve_prompt(&request.prompt, profile),
        negative_prompt: resolve_negative_prompt(request.effective_negative_prompt(), profile),
        width: request.width,
        height: request.height,
        steps: profile.steps,
        cfg_scale: profile.cfg_scale,
        sampler_name: profile.sampler_name.clone(),
        batch_size: 1,
        n_iter: 1,
        seed: -1,
        restore_faces: false,
        tiling: false,
        do_not_save_samples: true,
        do_not_save_grid: true,
        alwayson_scripts,
    }
}
