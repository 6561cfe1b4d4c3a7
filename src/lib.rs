//! ViewGuard person detection toolkit
//!
//! Two pipelines share one detection primitive:
//!
//! - **Live relay**: clients stream encoded frames over a WebSocket and get
//!   person boxes back for each frame (`relay`).
//! - **Offline precomputation**: stored videos are decoded once, detection
//!   runs on every N-th frame, and the boxes of the frames in between are
//!   carried forward from the last keyframe. The result is a per-video JSON
//!   document keyed by frame number (`sampler`, `boxes`, `document`).
//!
//! A legacy annotation flow (`annotate`) writes timed detections with
//! percentage boxes for manual review.
//!
//! # Module Structure
//!
//! - `detect`: detector backends (ONNX, contrast, stub) and the registry
//! - `ingest`: sequential video sources (FFmpeg files, synthetic streams)
//! - `normalize`: clamping and box representations
//! - `sampler`: keyframe decision and carry-forward state
//! - `boxes`, `document`: per-video bounding-box documents
//! - `annotate`: legacy annotation documents
//! - `batch`: input discovery and the per-video driver
//! - `relay`: HTTP + WebSocket live detection server
//! - `config`, `ui`: configuration loading and progress output

pub mod annotate;
pub mod batch;
pub mod boxes;
pub mod config;
pub mod detect;
pub mod document;
pub mod frame;
pub mod ingest;
pub mod normalize;
pub mod relay;
pub mod sampler;
pub mod ui;

pub use annotate::{AnnotateOptions, AnnotationDocument, TimedDetection};
pub use batch::{discover_annotation_inputs, discover_videos, run_batch, BatchReport, VideoOutcome};
pub use boxes::{build_video_document, BoxOptions};
pub use config::ViewguardConfig;
pub use detect::{
    BackendRegistry, ContrastBackend, DetectParams, DetectorBackend, ObjectClass, RawDetection,
    SharedDetector, StubBackend,
};
pub use document::{FrameTable, VideoDocument, VideoInfo};
pub use frame::{decode_image, Frame, FrameSize};
pub use ingest::{SourceConfig, SyntheticSpec, VideoMetadata, VideoSource};
pub use normalize::{Detection, PercentBox, PixelBox};
pub use relay::{ConnectionRegistry, RelayConfig, RelayHandle, RelayServer};
pub use sampler::{CarryState, FrameRecord, KeyframeSampler};
pub use ui::{Ui, UiMode};
