//! generate_boxes - precompute per-frame person boxes for stored videos
//!
//! Every `*.mp4` under the videos directory (or the videos given on the
//! command line) is decoded once. Detection runs on every N-th frame and the
//! boxes are carried forward in between. One `<stem>_boxes.json` is written
//! per video; a video that fails is reported and skipped.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use viewguard::{boxes, discover_videos, run_batch, BackendRegistry, ObjectClass, Ui, ViewguardConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Precompute bounding boxes for stored videos")]
struct Args {
    /// Videos to process. When empty, the videos directory is scanned.
    videos: Vec<PathBuf>,

    /// Directory scanned recursively for `*.mp4`.
    #[arg(long)]
    videos_dir: Option<PathBuf>,

    /// Directory receiving `<stem>_boxes.json`.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run detection every N frames.
    #[arg(long)]
    interval: Option<u32>,

    /// Engine confidence threshold.
    #[arg(long)]
    confidence: Option<f32>,

    /// Engine IoU threshold.
    #[arg(long)]
    iou: Option<f32>,

    /// Detector backend (tract|contrast, or stub for a dry run).
    #[arg(long)]
    backend: Option<String>,

    /// Path to the ONNX model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::from_args(Some(&args.ui));

    let mut config = ViewguardConfig::load()?;
    if let Some(dir) = args.videos_dir {
        config.boxes.videos_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.boxes.output_dir = dir;
    }
    if let Some(interval) = args.interval {
        config.boxes.options.frame_interval = interval;
    }
    if let Some(confidence) = args.confidence {
        config.boxes.options.confidence = confidence;
    }
    if let Some(iou) = args.iou {
        config.boxes.options.iou = iou;
    }
    if let Some(backend) = args.backend {
        config.detector.backend = backend;
    }
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    config.validate()?;

    let videos = if args.videos.is_empty() {
        let _stage = ui.stage("Discover videos");
        discover_videos(&config.boxes.videos_dir)?
    } else {
        args.videos
    };
    if videos.is_empty() {
        log::warn!("no videos found in {}", config.boxes.videos_dir.display());
        return Ok(());
    }
    log::info!("found {} video(s) to process", videos.len());

    std::fs::create_dir_all(&config.boxes.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.boxes.output_dir.display()
        )
    })?;

    let detector = {
        let _stage = ui.stage("Load detector");
        BackendRegistry::from_settings(&config.detector)?.backend_for_class(ObjectClass::Person)?
    };
    let mut detector = detector
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;

    let report = {
        let _stage = ui.stage("Generate bounding boxes");
        run_batch(&videos, |video| {
            boxes::process_video(
                video,
                &config.boxes.output_dir,
                &mut *detector,
                &config.boxes.options,
                &ui,
            )
        })
    };

    log::info!(
        "processing complete: {} written, {} failed. bounding boxes saved to {}",
        report.written().len(),
        report.failed().len(),
        config.boxes.output_dir.display()
    );
    for video in report.failed() {
        log::warn!("skipped {}", video.display());
    }
    Ok(())
}
