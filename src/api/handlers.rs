// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{extract::State, Json};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use super::http_server::AppState;
use crate::diffusion::BackendModel;
use crate::styles::StyleSummary;
use crate::version;

/// Styles keyed by id, in registry order
#[derive(Debug, Clone)]
pub struct StylesResponse {
    pub styles: Vec<StyleSummary>,
}

struct StyleEntry<'a>(&'a StyleSummary);

impl Serialize for StyleEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entry = serializer.serialize_struct("StyleInfo", 2)?;
        entry.serialize_field("name", &self.0.name)?;
        entry.serialize_field("description", &self.0.description)?;
        entry.end()
    }
}

struct StyleMap<'a>(&'a [StyleSummary]);

impl Serialize for StyleMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for style in self.0 {
            map.serialize_entry(&style.id, &StyleEntry(style))?;
        }
        map.end()
    }
}

impl Serialize for StylesResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut body = serializer.serialize_struct("StylesResponse", 1)?;
        body.serialize_field("styles", &StyleMap(&self.styles))?;
        body.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sd_webui_available: bool,
    pub message: String,
}

/// Backend failures are reported in the body with `success: false`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<BackendModel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/styles
pub async fn styles_handler(State(state): State<AppState>) -> Json<StylesResponse> {
    Json(StylesResponse {
        styles: state.orchestrator.styles().list(),
    })
}

/// GET /api/health - fresh probe on every call
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let health = state.orchestrator.check_health().await;
    debug!("Health check: backend available={}", health.available);

    let message = if health.available {
        "All services are running"
    } else {
        "Stable Diffusion WebUI is not available"
    };

    Json(HealthResponse {
        status: health.status().to_string(),
        sd_webui_available: health.available,
        message: message.to_string(),
    })
}

/// GET /api/models
pub async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    let response = match state.orchestrator.list_models().await {
        Ok(models) => ModelsResponse {
            success: true,
            models: Some(models),
            error: None,
        },
        Err(e) => ModelsResponse {
            success: false,
            models: None,
            error: Some(e.to_string()),
        },
    };
    Json(response)
}

/// GET /
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(version::get_version_info())
}
