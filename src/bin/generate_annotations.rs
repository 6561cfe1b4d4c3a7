//! generate_annotations - legacy annotation generator
//!
//! Scans the `usable_*` category folders of the footage directory and
//! writes one `<stem>.json` per video with timed person detections as
//! percentage boxes. The `events` list is left empty for manual review.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use viewguard::{
    annotate, discover_annotation_inputs, run_batch, BackendRegistry, ObjectClass, Ui,
    ViewguardConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate person annotations for categorized footage")]
struct Args {
    /// Directory holding the `usable_*` category folders.
    #[arg(long)]
    footage_dir: Option<PathBuf>,

    /// Directory receiving `<stem>.json`.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run detection on every N-th frame.
    #[arg(long)]
    frame_skip: Option<u32>,

    /// Keep detections scoring above this.
    #[arg(long)]
    confidence: Option<f32>,

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
    if let Some(dir) = args.footage_dir {
        config.annotations.footage_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.annotations.output_dir = dir;
    }
    if let Some(skip) = args.frame_skip {
        config.annotations.options.frame_skip = skip;
    }
    if let Some(confidence) = args.confidence {
        config.annotations.options.confidence = confidence;
    }
    if let Some(backend) = args.backend {
        config.detector.backend = backend;
    }
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.annotations.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.annotations.output_dir.display()
        )
    })?;

    let videos = discover_annotation_inputs(&config.annotations.footage_dir)?;
    log::info!("found {} video(s) to process", videos.len());
    if videos.is_empty() {
        log::warn!("no videos found!");
        return Ok(());
    }

    let detector = {
        let _stage = ui.stage("Load detector");
        BackendRegistry::from_settings(&config.detector)?.backend_for_class(ObjectClass::Person)?
    };
    let mut detector = detector
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;

    let report = run_batch(&videos, |video| {
        annotate::process_video(
            video,
            &config.annotations.output_dir,
            &mut *detector,
            &config.annotations.options,
            &ui,
        )
    });

    log::info!(
        "processing complete: {} written, {} failed. annotations saved to {}",
        report.written().len(),
        report.failed().len(),
        config.annotations.output_dir.display()
    );
    log::info!("next: review the generated files and add incident entries to each 'events' list");
    Ok(())
}
