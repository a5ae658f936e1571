// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Stable Diffusion WebUI client (`/sdapi/v1/*`)

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{BackendError, BackendModel, RawResult, SynthesisBackend};
use super::payload::GenerationPayload;
use crate::config::Settings;

/// Default timeout for a generation call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for the liveness probe and model listing
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error bodies are cut to this many characters before being surfaced
const MAX_ERROR_BODY_CHARS: usize = 1000;

/// Client for a Stable Diffusion WebUI started with `--api`
pub struct WebUiClient {
    client: Client,
    endpoint: String,
    call_timeout: Duration,
    probe_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
    /// Generation parameters; the WebUI sends them as a JSON-encoded string
    #[serde(default)]
    info: Option<serde_json::Value>,
}

/// Pull the seed out of the WebUI `info` field (string or object)
fn parse_seed(info: Option<&serde_json::Value>) -> Option<i64> {
    match info? {
        serde_json::Value::String(raw) => serde_json::from_str::<serde_json::Value>(raw)
            .ok()?
            .get("seed")?
            .as_i64(),
        value => value.get("seed")?.as_i64(),
    }
}

fn truncate_body(body: String) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body;
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Body of a non-200 response; an unreadable body is logged and surfaced as empty
async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) => truncate_body(text),
        Err(e) => {
            debug!("Failed to read WebUI error body: {}", e);
            String::new()
        }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(timeout)
    } else {
        BackendError::ConnectionFailure(err.to_string())
    }
}

impl WebUiClient {
    /// Create a client for the WebUI at `endpoint`
    pub fn new(endpoint: &str, call_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_PROBE_TIMEOUT)
            .build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "WebUI client configured: endpoint={}, timeout={}s",
            endpoint,
            call_timeout.as_secs()
        );

        Ok(Self {
            client,
            endpoint,
            call_timeout,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(&settings.sd_webui_url, settings.call_timeout())?
            .with_probe_timeout(settings.probe_timeout()))
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

#[async_trait]
impl SynthesisBackend for WebUiClient {
    async fn probe(&self) -> bool {
        match self
            .client
            .get(format!("{}/sdapi/v1/options", self.endpoint))
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().as_u16() == 200,
            Err(e) => {
                debug!("WebUI health check failed: {}", e);
                false
            }
        }
    }

    async fn txt2img(&self, payload: &GenerationPayload) -> Result<RawResult, BackendError> {
        let url = format!("{}/sdapi/v1/txt2img", self.endpoint);
        debug!(
            "WebUI txt2img POST {} (conditioned={})",
            url,
            payload.is_conditioned()
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.call_timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| classify(e, self.call_timeout))?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(BackendError::NonSuccessStatus {
                code: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, self.call_timeout))?;

        let parsed: Txt2ImgResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("WebUI returned an unreadable txt2img body: {}", e);
                return Err(BackendError::EmptyResult);
            }
        };

        let images: Vec<String> = parsed
            .images
            .into_iter()
            .filter(|img| !img.is_empty())
            .collect();
        if images.is_empty() {
            return Err(BackendError::EmptyResult);
        }

        Ok(RawResult {
            images,
            seed: parse_seed(parsed.info.as_ref()),
        })
    }

    async fn list_models(&self) -> Result<Vec<BackendModel>, BackendError> {
        let url = format!("{}/sdapi/v1/sd-models", self.endpoint);
        debug!("WebUI list_models GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| classify(e, self.probe_timeout))?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(BackendError::NonSuccessStatus {
                code: status.as_u16(),
                body: error_body(response).await,
            });
        }

        response
            .json::<Vec<BackendModel>>()
            .await
            .map_err(|e| classify(e, self.probe_timeout))
    }
}
