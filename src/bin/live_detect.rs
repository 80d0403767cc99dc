//! live_detect - run the detection overlay against a synthetic camera
//!
//! This binary:
//! 1. Loads configuration (LIVE_DETECT_CONFIG + env overrides + flags)
//! 2. Selects the session detector from the asset bundle
//! 3. Binds the synthetic camera to the frame pipeline
//! 4. Logs every published batch mapped into the viewport
//! 5. Shuts down on Ctrl-C, after --seconds, or after --frames

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use live_detect::config::{parse_dimensions, AppConfig};
use live_detect::{
    select_detector, AssetBundle, BindingState, BuiltinFactory, CameraProvider, FramePipeline,
    PreviewSurface, SyntheticCamera,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Asset bundle directory holding the optional custom model.
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Bundle-relative model path.
    #[arg(long)]
    model: Option<String>,
    /// Viewport size, e.g. 1080x1920.
    #[arg(long)]
    viewport: Option<String>,
    /// Rotation reported by the camera (0, 90, 180, 270).
    #[arg(long)]
    rotation: Option<u32>,
    /// Camera frames per second.
    #[arg(long)]
    fps: Option<u32>,
    /// Stop after this many captured frames.
    #[arg(long)]
    frames: Option<u64>,
    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = AppConfig::load()?;
    apply_args(&mut cfg, &args)?;

    let viewport = cfg.viewport()?;
    let bundle = AssetBundle::new(&cfg.asset_dir);
    let selected = select_detector(&bundle, &cfg.model, &BuiltinFactory);

    let mut camera_cfg = cfg.synthetic_camera()?;
    camera_cfg.max_frames = args.frames;
    let mut camera = SyntheticCamera::new(camera_cfg)?;

    let mut pipeline = FramePipeline::new(selected.backend, move |batch| {
        if batch.is_empty() {
            log::info!("no objects detected");
            return;
        }
        for detection in &batch {
            let mapped = detection.map_to_viewport(viewport);
            log::info!(
                "{} ({:.0}%) at [{:.0}, {:.0}, {:.0}, {:.0}]",
                detection.label(),
                detection.confidence() * 100.0,
                mapped.left,
                mapped.top,
                mapped.right,
                mapped.bottom
            );
        }
    })?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    pipeline.start(PreviewSurface::new("synthetic-preview", viewport));
    if pipeline.provider_ready(&mut camera) != BindingState::Bound {
        log::warn!("camera session did not start");
    }

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut last_stats_log = Instant::now();
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        if args
            .frames
            .is_some_and(|frames| camera.frames_captured() >= frames)
        {
            // Let the last frame finish analysis.
            std::thread::sleep(Duration::from_millis(200));
            break;
        }
        if last_stats_log.elapsed() >= Duration::from_secs(5) {
            let stats = pipeline.stats();
            log::info!(
                "frames received={} dropped={} analyzed={} failed={} published={}",
                stats.frames_received,
                stats.frames_dropped,
                stats.frames_analyzed,
                stats.analysis_failures,
                stats.batches_published
            );
            last_stats_log = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    camera.unbind_all();
    pipeline.shutdown()?;
    log::info!(
        "captured {} frames, {} buffers outstanding",
        camera.frames_captured(),
        camera.buffers_outstanding()
    );
    Ok(())
}

fn apply_args(cfg: &mut AppConfig, args: &Args) -> Result<()> {
    if let Some(assets) = &args.assets {
        cfg.asset_dir = assets.clone();
    }
    if let Some(model) = &args.model {
        cfg.model.model = model.clone();
    }
    if let Some(viewport) = &args.viewport {
        let (width, height) = parse_dimensions(viewport)
            .ok_or_else(|| anyhow!("--viewport must look like 1080x1920"))?;
        cfg.viewport_width = width;
        cfg.viewport_height = height;
    }
    if let Some(rotation) = args.rotation {
        cfg.camera.rotation_degrees = rotation;
    }
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        cfg.camera.target_fps = fps;
    }
    cfg.rotation()?;
    Ok(())
}
