// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use sketch_render_node::{
    api::{start_server, AppState},
    config::Settings,
    diffusion::{Orchestrator, SynthesisBackend, WebUiClient},
    styles::StyleRegistry,
    version,
};
use std::{env, sync::Arc};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("Starting {}", version::get_version_string());

    let settings = Settings::load()?;
    info!("Debug mode: {}", settings.debug);
    info!("Stable Diffusion WebUI URL: {}", settings.sd_webui_url);
    info!(
        "Max upload size: {} bytes, allowed origins: {:?}",
        settings.max_file_size, settings.allowed_origins
    );

    let client = WebUiClient::from_settings(&settings)?;
    if client.probe().await {
        info!("Stable Diffusion WebUI is reachable");
    } else {
        warn!("Stable Diffusion WebUI is not reachable yet; generation requests will return 503 until it is");
    }

    let styles = StyleRegistry::builtin();
    info!("Loaded {} style profiles", styles.len());

    let orchestrator = Orchestrator::new(Arc::new(client), Arc::new(styles), settings.max_file_size);
    let state = AppState::new(Arc::new(orchestrator), settings);

    start_server(state).await?;

    info!("Shutting down {}", version::SERVICE_NAME);
    Ok(())
}
