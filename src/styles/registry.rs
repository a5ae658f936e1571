// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Built-in style profiles and id lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Style every unknown identifier falls back to
pub const DEFAULT_STYLE: &str = "realistic";

/// Generation settings attached to a named art style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Appended verbatim to the user prompt (carries its own leading ", ")
    pub prompt_suffix: String,
    pub negative_prompt: String,
    pub sampler_name: String,
    pub steps: u32,
    pub cfg_scale: f32,
    /// ControlNet weight in [0, 1]
    pub conditioning_strength: f32,
}

/// Public view of a style for discovery endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Immutable, ordered set of style profiles
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    profiles: Vec<StyleProfile>,
    index: HashMap<String, usize>,
    default_idx: usize,
}

#[allow(clippy::too_many_arguments)]
fn profile(
    id: &str,
    name: &str,
    description: &str,
    prompt_suffix: &str,
    negative_prompt: &str,
    sampler_name: &str,
    steps: u32,
    cfg_scale: f32,
    conditioning_strength: f32,
) -> StyleProfile {
    StyleProfile {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        prompt_suffix: prompt_suffix.to_string(),
        negative_prompt: negative_prompt.to_string(),
        sampler_name: sampler_name.to_string(),
        steps,
        cfg_scale,
        conditioning_strength,
    }
}

fn build_index(profiles: &[StyleProfile]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(profiles.len());
    for (i, p) in profiles.iter().enumerate() {
        // First definition wins on duplicate ids
        index.entry(p.id.clone()).or_insert(i);
    }
    index
}

impl StyleRegistry {
    /// Build a registry from an ordered list of profiles.
    ///
    /// Returns `None` when `default_id` is not among the profiles, since every
    /// lookup must be able to fall back to it.
    pub fn new(profiles: Vec<StyleProfile>, default_id: &str) -> Option<Self> {
        let index = build_index(&profiles);
        let default_idx = *index.get(default_id)?;
        Some(Self {
            profiles,
            index,
            default_idx,
        })
    }

    /// The eight styles shipped with the service
    pub fn builtin() -> Self {
        let profiles = vec![
            profile(
                "realistic",
                "Realistic",
                "Photorealistic, detailed, high quality",
                ", photorealistic, high quality, detailed, 8k resolution, professional photography",
                "cartoon, anime, drawing, sketch, painting, illustration, low quality, blurry",
                "DPM++ 2M Karras",
                30,
                7.5,
                1.0,
            ),
            profile(
                "cartoon",
                "Cartoon",
                "Animated cartoon style, colorful and vibrant",
                ", cartoon style, animated, colorful, cel shading, Disney style",
                "photorealistic, real photo, dark, gritty",
                "Euler a",
                25,
                8.0,
                0.9,
            ),
            profile(
                "anime",
                "Anime",
                "Japanese anime/manga style",
                ", anime style, manga, cel shading, vibrant colors, detailed",
                "realistic, photo, western cartoon, low quality",
                "DPM++ SDE Karras",
                28,
                8.5,
                0.9,
            ),
            profile(
                "oil_painting",
                "Oil Painting",
                "Classical oil painting style",
                ", oil painting, classical art, painted, artistic, brushstrokes",
                "photo, cartoon, anime, digital art, low quality",
                "DPM++ 2M Karras",
                35,
                7.0,
                0.8,
            ),
            profile(
                "watercolor",
                "Watercolor",
                "Soft watercolor painting style",
                ", watercolor painting, soft colors, artistic, painted, delicate",
                "photo, harsh lines, digital art, cartoon",
                "Euler a",
                25,
                6.5,
                0.7,
            ),
            profile(
                "digital_art",
                "Digital Art",
                "Modern digital artwork style",
                ", digital art, concept art, artstation, detailed, high quality",
                "photo, sketch, low quality, blurry",
                "DPM++ 2M Karras",
                30,
                7.5,
                0.9,
            ),
            profile(
                "cyberpunk",
                "Cyberpunk",
                "Futuristic cyberpunk aesthetic",
                ", cyberpunk, neon lights, futuristic, sci-fi, detailed, high tech",
                "medieval, vintage, low tech, low quality",
                "DPM++ SDE Karras",
                32,
                8.0,
                1.0,
            ),
            profile(
                "fantasy",
                "Fantasy",
                "Magical fantasy art style",
                ", fantasy art, magical, ethereal, detailed, enchanted",
                "modern, realistic, low quality, mundane",
                "DPM++ 2M Karras",
                30,
                7.5,
                0.9,
            ),
        ];

        // DEFAULT_STYLE is the first entry above
        let index = build_index(&profiles);
        Self {
            profiles,
            index,
            default_idx: 0,
        }
    }

    /// Resolve a style id, falling back to the default profile for unknown ids
    pub fn resolve(&self, id: &str) -> &StyleProfile {
        let idx = self.index.get(id).copied().unwrap_or(self.default_idx);
        &self.profiles[idx]
    }

    /// Whether `id` names a registered style
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// The fallback profile
    pub fn default_profile(&self) -> &StyleProfile {
        &self.profiles[self.default_idx]
    }

    /// Registered styles in registration order
    pub fn list(&self) -> Vec<StyleSummary> {
        self.profiles
            .iter()
            .map(|p| StyleSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                description: p.description.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
