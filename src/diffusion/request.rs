// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generation request type and its input bounds

use super::errors::ClientInputError;
use crate::sketch::SketchAsset;
use crate::styles::DEFAULT_STYLE;

/// Maximum prompt length in characters
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Maximum negative prompt length in characters
pub const MAX_NEGATIVE_PROMPT_CHARS: usize = 500;

/// Allowed output dimension range (inclusive)
pub const MIN_DIMENSION: u32 = 64;
pub const MAX_DIMENSION: u32 = 2048;

pub const DEFAULT_DIMENSION: u32 = 512;

/// One sketch-to-image request as handed to the orchestrator
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Style id; unknown ids fall back to the default style
    pub style: String,
    pub width: u32,
    pub height: u32,
    pub sketch: Option<SketchAsset>,
}

impl GenerationRequest {
    /// Prompt-only request with the default style at 512x512
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            style: DEFAULT_STYLE.to_string(),
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            sketch: None,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_sketch(mut self, sketch: SketchAsset) -> Self {
        self.sketch = Some(sketch);
        self
    }

    /// User negative prompt, treating blank input as absent
    pub fn effective_negative_prompt(&self) -> Option<&str> {
        self.negative_prompt
            .as_deref()
            .filter(|neg| !neg.trim().is_empty())
    }

    /// Check the prompt alone
    pub fn validate_prompt(&self) -> Result<(), ClientInputError> {
        if self.prompt.trim().is_empty() {
            return Err(ClientInputError::EmptyPrompt);
        }
        let len = self.prompt.chars().count();
        if len > MAX_PROMPT_CHARS {
            return Err(ClientInputError::PromptTooLong {
                len,
                max: MAX_PROMPT_CHARS,
            });
        }
        Ok(())
    }

    /// Check the text and dimension bounds (the sketch is checked separately)
    pub fn validate(&self) -> Result<(), ClientInputError> {
        self.validate_prompt()?;

        if let Some(ref neg) = self.negative_prompt {
            let len = neg.chars().count();
            if len > MAX_NEGATIVE_PROMPT_CHARS {
                return Err(ClientInputError::NegativePromptTooLong {
                    len,
                    max: MAX_NEGATIVE_PROMPT_CHARS,
                });
            }
        }

        for (field, value) in [("width", self.width), ("height", self.height)] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                return Err(ClientInputError::DimensionOutOfRange {
                    field,
                    value,
                    min: MIN_DIMENSION,
                    max: MAX_DIMENSION,
                });
            }
        }

        Ok(())
    }
}
