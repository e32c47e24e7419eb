use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

mod audio;
mod display;
mod effects;
mod framebuffer;
mod ingest;
mod render;
mod settings;

use audio::AudioPipeline;
use display::{AnsiSurface, MemorySurface, RelaySurface, Surface};
use effects::{builtin, EffectRegistry};
use ingest::FrameIngestService;
use render::RenderLoop;
use settings::SettingsStore;

#[derive(Parser, Debug)]
#[command(
    name = "beatgrid",
    about = "Audio-reactive pixel-matrix visualizer with scripted effects and network frame ingestion"
)]
struct Args {
    /// Matrix width in pixels
    #[arg(long, default_value_t = 128)]
    width: usize,

    /// Matrix height in pixels
    #[arg(long, default_value_t = 64)]
    height: usize,

    /// Directory holding scripted effects (*.rhai)
    #[arg(long, default_value = "scripts")]
    scripts: PathBuf,

    /// UDP port for incoming frames
    #[arg(long, default_value_t = ingest::DEFAULT_PORT)]
    port: u16,

    /// Relay rendered frames to a remote matrix server (host:port)
    #[arg(long)]
    relay: Option<String>,

    /// Preview frames in the terminal
    #[arg(long)]
    preview: bool,

    /// JSON settings file; defaults apply when absent
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Preferred capture device name substring; repeatable, tried in order
    #[arg(long = "device")]
    devices: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("starting beatgrid {}x{}", args.width, args.height);

    let settings = Arc::new(match &args.settings {
        Some(path) => SettingsStore::load(path)?,
        None => SettingsStore::default(),
    });

    let mut ingest = FrameIngestService::new(args.width, args.height, args.port);
    if let Err(e) = ingest.start() {
        // The visualizer is still useful without network input.
        warn!("frame ingestion disabled: {e:#}");
    }

    let mut pipeline = AudioPipeline::new(Arc::clone(&settings), args.devices.clone());
    pipeline.start();

    let mut registry = EffectRegistry::new(&args.scripts, args.width, args.height);
    for effect in builtin::default_catalogue() {
        registry.register_native(effect);
    }
    registry.reload_scripts()?;
    info!("effects: {}", registry.names().join(", "));

    let mut render = RenderLoop::new(
        Arc::clone(&settings),
        registry,
        pipeline.snapshot_handle(),
        ingest.canvas_handle(),
        args.width,
        args.height,
    );

    let run_flag = render.run_flag();
    ctrlc::set_handler(move || {
        run_flag.store(false, Ordering::SeqCst);
    })?;

    let mut surface: Box<dyn Surface> = if let Some(addr) = &args.relay {
        Box::new(RelaySurface::connect(addr, args.width, args.height, (0, 0))?)
    } else if args.preview {
        Box::new(AnsiSurface::new(args.width, args.height))
    } else {
        Box::new(MemorySurface::new(args.width, args.height))
    };

    render.run(surface.as_mut())?;

    pipeline.stop();
    ingest.stop();
    info!("shutdown complete");
    Ok(())
}
