//! Video frame sources.
//!
//! - Local video files, decoded with FFmpeg (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` streams (testing, demos)
//!
//! Sources yield decoded RGB frames strictly in stream order and report the
//! container metadata (dimensions, frame rate, advertised frame count) up
//! front.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{SourceConfig, SourceStats, SyntheticSpec, VideoMetadata, VideoSource};
