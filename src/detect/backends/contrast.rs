use anyhow::Result;

use crate::detect::backend::{DetectParams, DetectorBackend};
use crate::detect::result::{ObjectClass, RawDetection};
use crate::frame::Frame;

const DEFAULT_LUMA_DELTA: f32 = 48.0;

/// CPU backend that boxes the foreground of a frame.
///
/// Pixels whose luma departs from the frame mean by more than `luma_delta`
/// are foreground. The backend reports one person box around all of them,
/// scored by how densely the box is filled. A uniform frame has no
/// foreground and yields nothing. No model is involved; this is the default
/// backend for builds without `backend-tract`.
pub struct ContrastBackend {
    luma_delta: f32,
}

impl ContrastBackend {
    pub fn new() -> Self {
        Self {
            luma_delta: DEFAULT_LUMA_DELTA,
        }
    }

    fn mean_luma(frame: &Frame) -> f32 {
        let count = frame.width as f64 * frame.height as f64;
        let mut total = 0.0f64;
        for y in 0..frame.height {
            for x in 0..frame.width {
                total += frame.luma(x, y) as f64;
            }
        }
        (total / count) as f32
    }
}

impl Default for ContrastBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for ContrastBackend {
    fn name(&self) -> &'static str {
        "contrast"
    }

    fn supports(&self, class: ObjectClass) -> bool {
        matches!(class, ObjectClass::Person)
    }

    fn detect(&mut self, frame: &Frame, params: &DetectParams) -> Result<Vec<RawDetection>> {
        if params.class != ObjectClass::Person || frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }

        let mean = Self::mean_luma(frame);
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        let mut marked = 0u64;
        for y in 0..frame.height {
            for x in 0..frame.width {
                if (frame.luma(x, y) - mean).abs() <= self.luma_delta {
                    continue;
                }
                marked += 1;
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
                });
            }
        }

        let Some((x1, y1, x2, y2)) = bounds else {
            return Ok(Vec::new());
        };
        let area = (x2 - x1 + 1) as f64 * (y2 - y1 + 1) as f64;
        let confidence = (marked as f64 / area).min(1.0) as f32;
        if confidence < params.confidence {
            return Ok(Vec::new());
        }

        Ok(vec![RawDetection::person(
            x1 as f32,
            y1 as f32,
            (x2 + 1) as f32,
            (y2 + 1) as f32,
            confidence,
        )])
    }
}
