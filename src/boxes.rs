//! Offline bounding-box precomputation.
//!
//! One sequential pass over a video: every frame gets an index, keyframes get
//! a fresh person detection, the frames in between carry the last keyframe's
//! boxes forward. The result is a `VideoDocument` written as
//! `<video-stem>_boxes.json`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::detect::{DetectParams, DetectorBackend};
use crate::document::{boxes_path, FrameTable, VideoDocument, VideoInfo};
use crate::ingest::{SourceConfig, VideoSource};
use crate::normalize::to_corners;
use crate::sampler::{CarryState, KeyframeSampler};
use crate::ui::Ui;

pub const DEFAULT_FRAME_INTERVAL: u32 = 15;
pub const DEFAULT_CONFIDENCE: f32 = 0.2;
pub const DEFAULT_IOU: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxOptions {
    /// Run detection on every `frame_interval`-th frame.
    pub frame_interval: u32,
    pub confidence: f32,
    pub iou: f32,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
        }
    }
}

impl BoxOptions {
    pub fn params(&self) -> DetectParams {
        DetectParams::person(self.confidence, self.iou)
    }
}

/// Decode `source` to exhaustion and assemble its document.
///
/// A decode error part-way through ends the pass like end of stream does;
/// the frames read so far are kept. `total_frames` is the number of frames
/// actually read.
pub fn build_video_document(
    source: &mut VideoSource,
    name: &str,
    detector: &mut dyn DetectorBackend,
    options: &BoxOptions,
    ui: &Ui,
) -> Result<VideoDocument> {
    let sampler = KeyframeSampler::new(options.frame_interval)?;
    let params = options.params();
    let metadata = source.metadata();

    let mut state = CarryState::default();
    let mut frames = FrameTable::new();
    let mut progress = ui.progress(name, metadata.total_frames);
    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                log::warn!(
                    "{}: decode failed after {} frames, stopping: {:#}",
                    name,
                    frames.len(),
                    err
                );
                break;
            }
        };

        let index = state.next_index();
        let size = frame.size();
        let (next, record) = sampler.step(state, index, || {
            let raw = detector.detect(&frame, &params)?;
            Ok(raw.iter().map(|r| to_corners(r, size)).collect())
        })?;
        state = next;
        frames.push(record)?;
        progress.inc();
    }
    drop(progress);

    let decoded = frames.len() as u64;
    if decoded != metadata.total_frames {
        log::warn!(
            "{}: container advertised {} frames, decoded {}",
            name,
            metadata.total_frames,
            decoded
        );
    }

    Ok(VideoDocument {
        video_info: VideoInfo {
            name: name.to_string(),
            width: metadata.width,
            height: metadata.height,
            fps: metadata.fps,
            total_frames: decoded,
            frame_interval: sampler.interval(),
        },
        frames,
    })
}

/// Process one video file end to end and return the written path.
pub fn process_video(
    video: &Path,
    out_dir: &Path,
    detector: &mut dyn DetectorBackend,
    options: &BoxOptions,
    ui: &Ui,
) -> Result<PathBuf> {
    let name = video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("video path {} has no file name", video.display()))?;
    let output = boxes_path(out_dir, video)?;

    let mut source = VideoSource::open(SourceConfig::new(video.to_string_lossy()))?;
    let metadata = source.metadata();
    log::info!(
        "processing {}: {}x{} @ {:.2} fps, {} frames, interval {}",
        name,
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.total_frames,
        options.frame_interval
    );

    let document = build_video_document(&mut source, &name, detector, options, ui)?;
    document.write_to(&output)?;
    log::info!(
        "{}: {} frames, {} keyframes -> {}",
        name,
        document.video_info.total_frames,
        document.keyframe_count(),
        output.display()
    );
    Ok(output)
}
