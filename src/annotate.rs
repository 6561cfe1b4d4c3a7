//! Legacy annotation generator.
//!
//! Runs detection on every `frame_skip`-th frame (1-based counter, no
//! interpolation) and writes discrete timed person detections with
//! percentage boxes to `<video-stem>.json`. The `events` list is left empty
//! for manual review.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::{DetectParams, DetectorBackend};
use crate::document::write_json;
use crate::ingest::{SourceConfig, VideoSource};
use crate::normalize::{round_to, to_percent, PercentBox};
use crate::ui::Ui;

pub const DEFAULT_FRAME_SKIP: u32 = 5;
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_IOU: f32 = 0.45;

const CATEGORY_PREFIX: &str = "usable_";
const KNOWN_CATEGORIES: [&str; 4] = ["burglary", "fight", "shoplifting", "vandalism"];
const UNKNOWN_CATEGORY: &str = "unknown";
const PERSON_LABEL: &str = "PERSON";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotateOptions {
    pub frame_skip: u32,
    /// Detections must score strictly above this.
    pub confidence: f32,
    pub iou: f32,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            frame_skip: DEFAULT_FRAME_SKIP,
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationDocument {
    pub video_file: String,
    pub category: String,
    pub duration: f64,
    pub detections: Vec<TimedDetection>,
    pub events: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedDetection {
    /// Seconds from the start of the video.
    pub time: f64,
    #[serde(rename = "type")]
    pub kind: String,
    /// 0-100 scale, one decimal.
    pub confidence: f64,
    pub bounding_box: PercentBox,
}

/// Map a footage folder name to its category label.
pub fn category_for(dir_name: &str) -> &'static str {
    let name = dir_name.strip_prefix(CATEGORY_PREFIX).unwrap_or(dir_name);
    KNOWN_CATEGORIES
        .iter()
        .copied()
        .find(|known| *known == name)
        .unwrap_or(UNKNOWN_CATEGORY)
}

/// Category of a video from the name of its parent folder.
pub fn category_of(video: &Path) -> &'static str {
    video
        .parent()
        .and_then(Path::file_name)
        .map(|name| category_for(&name.to_string_lossy()))
        .unwrap_or(UNKNOWN_CATEGORY)
}

/// `<out_dir>/<video-stem>.json`
pub fn annotation_path(out_dir: &Path, video: &Path) -> Result<PathBuf> {
    let stem = video
        .file_stem()
        .ok_or_else(|| anyhow!("video path {} has no file name", video.display()))?;
    Ok(out_dir.join(format!("{}.json", stem.to_string_lossy())))
}

fn seconds(frames: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        round_to(frames as f64 / fps, 2)
    } else {
        0.0
    }
}

/// Decode `source` to exhaustion, sampling every `frame_skip`-th frame.
pub fn annotate_video(
    source: &mut VideoSource,
    video_file: &str,
    category: &str,
    detector: &mut dyn DetectorBackend,
    options: &AnnotateOptions,
    ui: &Ui,
) -> Result<AnnotationDocument> {
    if options.frame_skip == 0 {
        return Err(anyhow!("frame skip must be positive"));
    }
    let params = DetectParams::person(options.confidence, options.iou);
    let metadata = source.metadata();

    let mut detections = Vec::new();
    let mut counter: u64 = 0;
    let mut progress = ui.progress(video_file, metadata.total_frames);
    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                log::warn!(
                    "{}: decode failed after {} frames, stopping: {:#}",
                    video_file,
                    counter,
                    err
                );
                break;
            }
        };
        counter += 1;
        progress.inc();
        if counter % u64::from(options.frame_skip) != 0 {
            continue;
        }

        let raw = match detector.detect(&frame, &params) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("{}: detection failed on frame {}: {:#}", video_file, counter, err);
                continue;
            }
        };
        let time = seconds(counter, metadata.fps);
        let size = frame.size();
        detections.extend(
            raw.iter()
                .filter(|r| r.confidence > options.confidence)
                .map(|r| TimedDetection {
                    time,
                    kind: PERSON_LABEL.to_string(),
                    confidence: round_to(f64::from(r.confidence) * 100.0, 1),
                    bounding_box: to_percent(r, size),
                }),
        );
    }
    drop(progress);

    let total_frames = if metadata.total_frames > 0 {
        metadata.total_frames
    } else {
        counter
    };
    Ok(AnnotationDocument {
        video_file: video_file.to_string(),
        category: category.to_string(),
        duration: seconds(total_frames, metadata.fps),
        detections,
        events: Vec::new(),
    })
}

/// Annotate one video file and return the written path.
pub fn process_video(
    video: &Path,
    out_dir: &Path,
    detector: &mut dyn DetectorBackend,
    options: &AnnotateOptions,
    ui: &Ui,
) -> Result<PathBuf> {
    let video_file = video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("video path {} has no file name", video.display()))?;
    let output = annotation_path(out_dir, video)?;
    let category = category_of(video);

    let mut source = VideoSource::open(SourceConfig::new(video.to_string_lossy()))?;
    let metadata = source.metadata();
    log::info!(
        "annotating {} ({}): {}x{} @ {:.2} fps",
        video_file,
        category,
        metadata.width,
        metadata.height,
        metadata.fps
    );

    let document = annotate_video(&mut source, &video_file, category, detector, options, ui)?;
    write_json(&output, &document)?;
    log::info!(
        "{}: {} frames decoded, {} person instances -> {}",
        video_file,
        source.stats().frames_decoded,
        document.detections.len(),
        output.display()
    );
    Ok(output)
}
