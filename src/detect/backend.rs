use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::detect::result::{ObjectClass, RawDetection};
use crate::frame::Frame;

/// Parameters passed to the engine on every inference call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectParams {
    /// Only boxes of this class are returned.
    pub class: ObjectClass,
    /// Boxes scoring below this are dropped by the engine.
    pub confidence: f32,
    /// IoU above which overlapping boxes are suppressed.
    pub iou: f32,
}

impl DetectParams {
    pub fn person(confidence: f32, iou: f32) -> Self {
        Self {
            class: ObjectClass::Person,
            confidence,
            iou,
        }
    }
}

/// Detector backend trait.
///
/// A backend wraps one inference engine. It receives a decoded frame and
/// returns raw boxes in frame pixel coordinates, already filtered to
/// `params.class`, thresholded at `params.confidence` and suppressed at
/// `params.iou`. Backends never clamp; that is the normalizer's job.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend can report the class.
    fn supports(&self, class: ObjectClass) -> bool;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame, params: &DetectParams) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Backend shared between threads (relay connections, batch driver).
pub type SharedDetector = Arc<Mutex<dyn DetectorBackend>>;
