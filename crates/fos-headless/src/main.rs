//! fOS Headless - command line renderer
//!
//! Runs a script in a main context and writes the `canvas` element's
//! pixels to an image file. Worker scripts resolve against the script's
//! directory.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fos_canvas::ImageFormat;
use fos_headless::{RenderOptions, RenderSession};
use fos_js::{FileLoader, RuntimeConfig, RuntimeEnv};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Render a script's canvas to an image
#[derive(Parser, Debug)]
#[command(name = "fos-headless")]
#[command(about = "Render a script's canvas to an image", long_about = None)]
struct Args {
    /// Script to run in the main context
    script: PathBuf,

    /// Output image path [default: out.<format extension>]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export MIME type (image/png, image/jpeg, image/gif)
    #[arg(long, default_value = "image/png")]
    format: String,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// How long to wait for timers and workers to go quiet (ms)
    #[arg(long, default_value_t = 10_000)]
    settle_ms: u64,

    /// Heap limit per script context (MiB)
    #[arg(long, default_value_t = 32)]
    memory_mb: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let script = args
        .script
        .canonicalize()
        .with_context(|| format!("cannot open script {}", args.script.display()))?;
    let dir = script.parent().context("script has no parent directory")?;
    let name = script
        .file_name()
        .and_then(|name| name.to_str())
        .context("script file name is not valid UTF-8")?;

    let config = RuntimeConfig {
        memory_limit: args.memory_mb.saturating_mul(1024 * 1024),
        settle_timeout: Duration::from_millis(args.settle_ms),
        ..RuntimeConfig::default()
    };
    let options = RenderOptions {
        width: args.width,
        height: args.height,
        format: args.format.clone(),
        ..RenderOptions::from_config(&config)
    };
    let extension = ImageFormat::from_mime(&args.format).extension();
    let output = args.output.unwrap_or_else(|| PathBuf::from(format!("out.{extension}")));
    let loader = FileLoader::from_dir(dir).context("cannot load scripts from the script directory")?;
    let env = RuntimeEnv::builder()
        .config(config)
        .loader(loader)
        .build()
        .context("failed to start the script runtime")?;

    info!("Rendering {} ({}x{})", script.display(), args.width, args.height);

    let session = RenderSession::new(&env, options).context("failed to create render session")?;
    session
        .run_file(name)
        .with_context(|| format!("script {} failed", script.display()))?;

    let image = session.export().context("failed to encode the canvas")?;
    std::fs::write(&output, &image.bytes)
        .with_context(|| format!("cannot write {}", output.display()))?;
    info!(
        format = image.mime_type(),
        width = image.width,
        height = image.height,
        "Wrote {}",
        output.display()
    );

    session.context().terminate();
    env.shutdown();
    Ok(())
}
