/// One box as reported by a detector backend, in frame pixel coordinates.
///
/// Coordinates are engine-native floats and may fall outside the frame;
/// `crate::normalize` turns them into the canonical shapes.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class: ObjectClass,
}

impl RawDetection {
    pub fn person(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class: ObjectClass::Person,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Person,
    Other(u32),
}

impl ObjectClass {
    /// Map a COCO class index (as emitted by YOLO exports) to a class.
    pub fn from_coco(index: u32) -> Self {
        match index {
            0 => ObjectClass::Person,
            other => ObjectClass::Other(other),
        }
    }

    pub fn coco_index(self) -> u32 {
        match self {
            ObjectClass::Person => 0,
            ObjectClass::Other(index) => index,
        }
    }
}
