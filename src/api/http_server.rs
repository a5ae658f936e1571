// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::generate_image::{generate_image_handler, test_generate_handler};
use super::handlers::{health_handler, models_handler, root_handler, styles_handler};
use crate::config::Settings;
use crate::diffusion::Orchestrator;

/// Room for the non-file multipart fields and boundaries
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, settings: Settings) -> Self {
        Self {
            orchestrator,
            settings: Arc::new(settings),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.settings.max_file_size + MULTIPART_OVERHEAD;

    let api = Router::new()
        .route("/generate-image", post(generate_image_handler))
        .route("/test-generate", post(test_generate_handler))
        .route("/styles", get(styles_handler))
        .route("/health", get(health_handler))
        .route("/models", get(models_handler));

    Router::new()
        .route("/", get(root_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state.settings.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.settings.bind_address();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}
