// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod generate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::Settings;
use crate::diffusion::{Orchestrator, WebUiClient};
use crate::styles::StyleRegistry;

/// Sketch Render Node CLI
#[derive(Parser, Debug)]
#[command(name = "sketch-cli")]
#[command(version)]
#[command(about = "Drive sketch-to-image generation against a Stable Diffusion WebUI", long_about = None)]
pub struct Cli {
    /// WebUI base URL (overrides settings)
    #[arg(long, global = true, env = "SD_WEBUI_URL")]
    pub sd_webui_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the available art styles
    Styles,

    /// Check whether the WebUI is reachable
    Health,

    /// List the checkpoints the WebUI can serve
    Models,

    /// Generate an image from a sketch file
    Generate(generate::GenerateArgs),

    /// Generate an image from a prompt only
    TestGenerate(generate::TestGenerateArgs),
}

/// Settings from file/env with CLI overrides applied
pub fn resolve_settings(cli: &Cli) -> Result<Settings> {
    dotenv::dotenv().ok();
    let mut settings = Settings::load()?;
    if let Some(url) = &cli.sd_webui_url {
        settings.sd_webui_url = url.clone();
        settings.validate()?;
    }
    Ok(settings)
}

pub fn build_orchestrator(settings: &Settings) -> Result<Orchestrator> {
    let client = WebUiClient::from_settings(settings)?;
    Ok(Orchestrator::new(
        Arc::new(client),
        Arc::new(StyleRegistry::builtin()),
        settings.max_file_size,
    ))
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let settings = resolve_settings(&cli)?;
    let orchestrator = build_orchestrator(&settings)?;

    match cli.command {
        Commands::Styles => {
            generate::print_styles(&orchestrator);
            Ok(())
        }
        Commands::Health => generate::check_health(&orchestrator, &settings).await,
        Commands::Models => generate::list_models(&orchestrator).await,
        Commands::Generate(args) => generate::generate(&orchestrator, args).await,
        Commands::TestGenerate(args) => generate::test_generate(&orchestrator, args).await,
    }
}
