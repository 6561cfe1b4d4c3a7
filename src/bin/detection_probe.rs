//! detection_probe - quick check that the detector works on a video
//!
//! Runs the configured backend over the first frames of one video, logs
//! every person found and finishes with a short throughput summary.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use viewguard::ui::format_duration;
use viewguard::{
    BackendRegistry, DetectParams, DetectorBackend, ObjectClass, SourceConfig, Ui, VideoSource,
    ViewguardConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run person detection over the start of a video")]
struct Args {
    /// Video file, or `stub://<name>` for a synthetic stream.
    video: String,

    /// Stop after this many frames.
    #[arg(long, default_value_t = 30)]
    max_frames: u64,

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

#[derive(Debug, Default)]
struct ProbeSummary {
    frames: u64,
    frames_with_persons: u64,
    persons: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::from_args(Some(&args.ui));

    let mut config = ViewguardConfig::load()?;
    if let Some(backend) = args.backend {
        config.detector.backend = backend;
    }
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    config.validate()?;

    log::info!("ViewGuard detection probe: {}", args.video);
    let detector = {
        let _stage = ui.stage("Load detector");
        BackendRegistry::from_settings(&config.detector)?.backend_for_class(ObjectClass::Person)?
    };
    let mut detector = detector
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    let params = DetectParams::person(config.server.confidence, config.server.iou);

    let mut source = VideoSource::open(SourceConfig::new(args.video.clone()))?;
    let metadata = source.metadata();
    log::info!(
        "video info: {}x{}, fps {:.2}, total frames {}",
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.total_frames
    );

    let mut summary = ProbeSummary::default();
    let start = Instant::now();
    while summary.frames < args.max_frames {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        let detections = detector.detect(&frame, &params)?;
        if !detections.is_empty() {
            summary.frames_with_persons += 1;
            for detection in &detections {
                log::info!(
                    "frame {:3}: person detected (confidence: {:.2})",
                    summary.frames,
                    detection.confidence
                );
            }
        }
        summary.persons += detections.len() as u64;
        summary.frames += 1;
    }
    let elapsed = start.elapsed();

    let fps = if elapsed.as_secs_f64() > 0.0 {
        summary.frames as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    log::info!("frames processed: {}", summary.frames);
    log::info!("frames with persons: {}", summary.frames_with_persons);
    log::info!("total persons detected: {}", summary.persons);
    log::info!("processing time: {}", format_duration(elapsed));
    log::info!("average fps: {:.2}", fps);
    Ok(())
}
