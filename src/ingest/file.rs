//! Local video file source.
//!
//! `VideoSource` opens a local file (FFmpeg backend) or a `stub://<name>`
//! synthetic stream and hands out frames one by one until the stream is
//! exhausted. Remote URLs are rejected.

use anyhow::{anyhow, Result};
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";

/// Configuration for a video source.
#[derive(Clone, Debug, Default)]
pub struct SourceConfig {
    /// Local file path, or `stub://<name>` for a synthetic stream.
    pub path: String,
    /// Shape of the synthetic stream (ignored for real files).
    pub synthetic: SyntheticSpec,
}

impl SourceConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            synthetic: SyntheticSpec::default(),
        }
    }
}

/// Synthetic stream shape.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frames: u64,
    /// Frame count reported in the metadata, when it should differ from
    /// `frames`.
    pub advertised_frames: Option<u64>,
    /// Decoding frame `k` fails.
    pub fail_at: Option<u64>,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            frames: 90,
            advertised_frames: None,
            fail_at: None,
        }
    }
}

/// Container metadata, read when the source is opened.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame count advertised by the container. May differ from the number
    /// of frames that actually decode.
    pub total_frames: u64,
}

/// Statistics for a video source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_decoded: u64,
    pub path: String,
}

/// Sequential video frame source.
pub struct VideoSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl VideoSource {
    pub fn open(config: SourceConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "video sources only support local paths (no URL schemes): '{}'",
                config.path
            ));
        }
        if config.path.starts_with(STUB_SCHEME) {
            return Ok(Self {
                backend: SourceBackend::Synthetic(SyntheticSource::new(config)?),
            });
        }
        if !Path::new(&config.path).is_file() {
            return Err(anyhow!("video file '{}' does not exist", config.path));
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: SourceBackend::Ffmpeg(FfmpegFileSource::new(config)?),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "cannot decode '{}': video file decoding requires the ingest-file-ffmpeg feature",
                config.path
            ))
        }
    }

    pub fn metadata(&self) -> VideoMetadata {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.metadata(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.metadata(),
        }
    }

    /// Decode the next frame. `Ok(None)` once the stream is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// A dark block standing in for a person, sliding across a light background.
struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
}

impl SyntheticSource {
    fn new(config: SourceConfig) -> Result<Self> {
        let spec = &config.synthetic;
        if spec.width < 8 || spec.height < 3 {
            return Err(anyhow!(
                "synthetic stream {}x{} is too small",
                spec.width,
                spec.height
            ));
        }
        log::info!(
            "VideoSource: opened {} (synthetic {}x{}, {} frames)",
            config.path,
            spec.width,
            spec.height,
            spec.frames
        );
        Ok(Self {
            config,
            frame_count: 0,
        })
    }

    fn metadata(&self) -> VideoMetadata {
        let spec = &self.config.synthetic;
        VideoMetadata {
            width: spec.width,
            height: spec.height,
            fps: spec.fps,
            total_frames: spec.advertised_frames.unwrap_or(spec.frames),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.synthetic.frames {
            return Ok(None);
        }
        if self.config.synthetic.fail_at == Some(self.frame_count) {
            return Err(anyhow!(
                "{}: corrupt packet at frame {}",
                self.config.path,
                self.frame_count
            ));
        }
        let frame = self.render(self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn render(&self, index: u64) -> Result<Frame> {
        let SyntheticSpec { width, height, .. } = self.config.synthetic;
        let block_w = width / 8;
        let block_h = height / 3;
        let travel = (width - block_w) as u64;
        let left = ((index * 4) % travel.max(1)) as u32;
        let top = height / 3;

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let inside = x >= left && x < left + block_w && y >= top && y < top + block_h;
                let value = if inside { 30 } else { 210 };
                pixels.extend_from_slice(&[value, value, value]);
            }
        }
        Frame::new(pixels, width, height)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_decoded: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}
