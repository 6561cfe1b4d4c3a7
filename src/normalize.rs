//! Conversion of raw engine boxes into the shapes the outputs use.
//!
//! Three conventions coexist:
//! - corner form `[x1, y1, x2, y2]` in integer pixels (bounding-box documents)
//! - origin+size form `[x, y, width, height]` in float pixels (live relay)
//! - origin+size as percentages of the frame, one decimal (annotation documents)
//!
//! Every form clamps to the frame and orders the corners, so
//! `0 <= x1 <= x2 <= width` and `0 <= y1 <= y2 <= height` always hold.
//! Nothing here filters on confidence.

use serde::{Deserialize, Serialize};

use crate::detect::RawDetection;
use crate::frame::FrameSize;

/// Integer corner box, serialized as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn fits(&self, size: FrameSize) -> bool {
        self.x1 <= self.x2 && self.x2 <= size.width && self.y1 <= self.y2 && self.y2 <= size.height
    }
}

impl From<[u32; 4]> for PixelBox {
    fn from(v: [u32; 4]) -> Self {
        Self {
            x1: v[0],
            y1: v[1],
            x2: v[2],
            y2: v[3],
        }
    }
}

impl From<PixelBox> for [u32; 4] {
    fn from(b: PixelBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Canonical detection of the offline pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: PixelBox,
    pub confidence: f32,
}

/// Box as percentages of the frame dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Corner form: truncate toward zero, clamp each coordinate, order corners.
pub fn to_corners(raw: &RawDetection, size: FrameSize) -> Detection {
    let (x1, x2) = ordered(clamp_pixel(raw.x1, size.width), clamp_pixel(raw.x2, size.width));
    let (y1, y2) = ordered(
        clamp_pixel(raw.y1, size.height),
        clamp_pixel(raw.y2, size.height),
    );
    Detection {
        bbox: PixelBox { x1, y1, x2, y2 },
        confidence: raw.confidence,
    }
}

/// Origin+size form at full float precision.
pub fn to_origin_size(raw: &RawDetection, size: FrameSize) -> [f32; 4] {
    let (x1, x2) = ordered(clamp_float(raw.x1, size.width), clamp_float(raw.x2, size.width));
    let (y1, y2) = ordered(
        clamp_float(raw.y1, size.height),
        clamp_float(raw.y2, size.height),
    );
    [x1, y1, x2 - x1, y2 - y1]
}

/// Origin+size form as percentages, rounded to one decimal.
pub fn to_percent(raw: &RawDetection, size: FrameSize) -> PercentBox {
    let [x, y, w, h] = to_origin_size(raw, size);
    let pct = |value: f32, extent: u32| {
        if extent == 0 {
            0.0
        } else {
            round_to(value as f64 / extent as f64 * 100.0, 1)
        }
    };
    PercentBox {
        x: pct(x, size.width),
        y: pct(y, size.height),
        width: pct(w, size.width),
        height: pct(h, size.height),
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn clamp_pixel(value: f32, max: u32) -> u32 {
    // `as` truncates toward zero and maps NaN to 0.
    (value as i64).clamp(0, max as i64) as u32
}

fn clamp_float(value: f32, max: u32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, max as f32)
    } else {
        0.0
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if b < a {
        (b, a)
    } else {
        (a, b)
    }
}
