// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::diffusion::request::DEFAULT_DIMENSION;
use crate::diffusion::{GenerationRequest, GenerationResult, Orchestrator};
use crate::sketch::{self, SketchAsset};
use crate::styles::DEFAULT_STYLE;

/// Arguments for the generate command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Sketch image file
    #[arg(long)]
    pub sketch: PathBuf,

    /// Text prompt
    #[arg(long)]
    pub prompt: String,

    /// Art style id (see `styles`)
    #[arg(long, default_value = DEFAULT_STYLE)]
    pub style: String,

    /// Things to keep out of the image
    #[arg(long)]
    pub negative_prompt: Option<String>,

    #[arg(long, default_value_t = DEFAULT_DIMENSION)]
    pub width: u32,

    #[arg(long, default_value_t = DEFAULT_DIMENSION)]
    pub height: u32,

    /// Where to write the generated image
    #[arg(long, default_value = "generated.png")]
    pub out: PathBuf,
}

/// Arguments for the test-generate command
#[derive(Args, Debug)]
pub struct TestGenerateArgs {
    /// Text prompt
    #[arg(long)]
    pub prompt: String,

    /// Art style id (see `styles`)
    #[arg(long, default_value = DEFAULT_STYLE)]
    pub style: String,

    /// Where to write the generated image
    #[arg(long, default_value = "generated.png")]
    pub out: PathBuf,
}

pub fn print_styles(orchestrator: &Orchestrator) {
    println!("Available styles:");
    for style in orchestrator.styles().list() {
        println!("  {:<14} {} - {}", style.id, style.name, style.description);
    }
}

pub async fn check_health(orchestrator: &Orchestrator, settings: &Settings) -> Result<()> {
    let health = orchestrator.check_health().await;
    if health.available {
        println!("✅ Stable Diffusion WebUI at {} is available", settings.sd_webui_url);
        Ok(())
    } else {
        Err(anyhow!(
            "Stable Diffusion WebUI at {} is not available",
            settings.sd_webui_url
        ))
    }
}

pub async fn list_models(orchestrator: &Orchestrator) -> Result<()> {
    let models = orchestrator.list_models().await?;
    if models.is_empty() {
        println!("No models reported by the WebUI");
    }
    for model in models {
        println!("  {}", model.title);
    }
    Ok(())
}

/// Content type guessed from the file's magic bytes
fn sniff_content_type(bytes: &[u8]) -> Option<String> {
    sketch::detect_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling generation");
            token.cancel();
        }
    });
}

fn write_image(result: &GenerationResult, out: &Path) -> Result<()> {
    let bytes = STANDARD
        .decode(result.image_data.as_bytes())
        .context("Backend returned image data that is not valid base64")?;
    std::fs::write(out, bytes).with_context(|| format!("Failed to write {}", out.display()))?;

    let info = &result.info;
    println!("✅ Image written to {}", out.display());
    println!(
        "   style={} steps={} cfg={} sampler={} size={}x{} conditioned={}",
        info.style,
        info.steps,
        info.cfg_scale,
        info.sampler,
        info.width,
        info.height,
        info.conditioning_used
    );
    if let Some(seed) = info.seed {
        println!("   seed={}", seed);
    }
    Ok(())
}

pub async fn generate(orchestrator: &Orchestrator, args: GenerateArgs) -> Result<()> {
    let bytes = tokio::fs::read(&args.sketch)
        .await
        .with_context(|| format!("Failed to read sketch {}", args.sketch.display()))?;
    let content_type = sniff_content_type(&bytes);
    info!(
        "Loaded sketch {} ({} bytes, {:?})",
        args.sketch.display(),
        bytes.len(),
        content_type
    );

    let mut request = GenerationRequest::new(args.prompt)
        .with_style(args.style)
        .with_size(args.width, args.height)
        .with_sketch(SketchAsset::new(bytes, content_type));
    request.negative_prompt = args.negative_prompt;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let result = orchestrator.generate_with_cancel(request, &cancel).await?;
    write_image(&result, &args.out)
}

pub async fn test_generate(orchestrator: &Orchestrator, args: TestGenerateArgs) -> Result<()> {
    let result = orchestrator.generate_simple(&args.prompt, &args.style).await?;
    write_image(&result, &args.out)
}
