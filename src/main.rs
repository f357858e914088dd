use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use reader_upscale::engine::runtime::BilinearLoader;
use reader_upscale::{
    DescriptorRegistry, ModelManager, PageImage, PixelSize, UpscaleMode, UpscaleSettings,
};

/// Run the reader upscaling pipeline against a single page image.
///
/// Uses the same descriptor resolution, tiling and concurrency path as the
/// reader, with a deterministic bilinear runtime standing in for the neural
/// backend.
#[derive(Parser, Debug)]
#[command(name = "pagescale")]
#[command(about = "Upscale a page image through the reader's tiled inference pipeline")]
struct Args {
    /// Input page image (PNG, JPEG, ...)
    input: PathBuf,

    /// Output image path
    #[arg(short, long, default_value = "upscaled.png")]
    output: PathBuf,

    /// Upscaling mode
    #[arg(short, long, value_enum, default_value_t = UpscaleMode::Always)]
    mode: UpscaleMode,

    /// Screen size the decision policy evaluates against, as WIDTHxHEIGHT
    #[arg(short, long, default_value = "2048x2732")]
    screen: String,

    /// Auto mode: minimum screen-fit scale before upscaling kicks in
    #[arg(long, default_value_t = 1.0)]
    auto_trigger_scale: f64,

    /// Always mode: largest source-to-screen multiple still upscaled
    #[arg(long, default_value_t = 2.0)]
    always_max_screen_scale: f64,

    /// Extra storage root searched for a Models/ directory
    #[arg(long)]
    models_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reader_upscale=info".into()),
        )
        .init();

    let args = Args::parse();
    let screen = parse_screen(&args.screen)?;

    let settings = UpscaleSettings {
        mode: args.mode,
        auto_trigger_scale: args.auto_trigger_scale,
        always_max_screen_scale: args.always_max_screen_scale,
        ..UpscaleSettings::default()
    };
    settings.validate().map_err(anyhow::Error::msg)?;

    let mut roots = reader_upscale::config::default_storage_roots();
    if let Some(root) = args.models_root {
        roots.insert(0, root);
    }

    let manager = ModelManager::new(
        DescriptorRegistry::new(roots),
        Arc::new(BilinearLoader::new()),
        settings,
    );

    let decoded = image::open(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?
        .to_rgba8();
    let page = PageImage::from(decoded);
    println!("Input: {} ({}x{})", args.input.display(), page.width(), page.height());

    let decision = manager.decide(page.pixel_size(), screen);
    println!(
        "Decision: should_upscale={} required_scale={:.2}",
        decision.should_upscale, decision.required_scale
    );

    match manager
        .maybe_upscale(&page, screen, &CancellationToken::new())
        .await
    {
        Some(upscaled) => {
            let out: image::RgbaImage = (&upscaled).into();
            out.save(&args.output)
                .with_context(|| format!("failed to write {}", args.output.display()))?;
            println!(
                "Output: {} ({}x{})",
                args.output.display(),
                upscaled.width(),
                upscaled.height()
            );
        }
        None => println!("Page left unmodified (skipped or no model available)"),
    }

    Ok(())
}

/// Parse a screen size string like "2048x2732"
fn parse_screen(screen: &str) -> Result<PixelSize> {
    let (w, h) = screen
        .split_once(['x', 'X'])
        .with_context(|| format!("invalid screen size: {screen} (expected WIDTHxHEIGHT)"))?;
    let width: f64 = w
        .trim()
        .parse()
        .with_context(|| format!("invalid screen width: {w}"))?;
    let height: f64 = h
        .trim()
        .parse()
        .with_context(|| format!("invalid screen height: {h}"))?;
    Ok(PixelSize::new(width, height))
}
