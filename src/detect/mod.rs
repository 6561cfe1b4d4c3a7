mod backend;
mod backends;
mod nms;
mod registry;
mod result;

pub use backend::{DetectParams, DetectorBackend, SharedDetector};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{ContrastBackend, StubBackend};
pub use nms::{iou, non_max_suppression};
pub use registry::BackendRegistry;
pub use result::{ObjectClass, RawDetection};
