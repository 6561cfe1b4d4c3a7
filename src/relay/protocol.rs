//! Live relay message protocol.
//!
//! Inbound text messages are JSON objects with a `type` discriminator. Only
//! `"frame"` messages are processed; the discriminator is checked before any
//! other field is read, so unknown message kinds never fail on their payload.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::detect::{DetectParams, SharedDetector};
use crate::frame::{decode_image, Frame};
use crate::normalize::to_origin_size;

pub const FRAME_MESSAGE_TYPE: &str = "frame";
pub const DEFAULT_MESSAGE_CONFIDENCE: f32 = 0.5;

fn default_confidence() -> f32 {
    DEFAULT_MESSAGE_CONFIDENCE
}

fn default_timestamp() -> serde_json::Value {
    serde_json::Value::String(String::new())
}

/// A `"frame"` message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FrameMessage {
    /// Base64 encoded JPEG or PNG.
    pub data: String,
    #[serde(default)]
    pub camera_id: i64,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Echoed back untouched.
    #[serde(default = "default_timestamp")]
    pub timestamp: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Frame(FrameMessage),
    /// Any other discriminator, or none at all.
    Ignored(Option<String>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxScore {
    /// `[x, y, width, height]` in frame pixels.
    pub bbox: [f32; 4],
    pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameResponse {
    pub camera_id: i64,
    pub detections: Vec<BoxScore>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub timestamp: serde_json::Value,
}

/// Parse one inbound text message. Errors mean the message is malformed.
pub fn parse_message(text: &str) -> Result<Inbound> {
    let value: serde_json::Value = serde_json::from_str(text).context("message is not JSON")?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    if kind.as_deref() != Some(FRAME_MESSAGE_TYPE) {
        return Ok(Inbound::Ignored(kind));
    }
    let message = serde_json::from_value(value).context("malformed frame message")?;
    Ok(Inbound::Frame(message))
}

/// Decode the base64 payload of a frame message into pixels.
pub fn decode_frame(message: &FrameMessage) -> Result<Frame> {
    let bytes = general_purpose::STANDARD
        .decode(message.data.trim())
        .context("frame data is not base64")?;
    decode_image(&bytes)
}

/// Run detection on a decoded frame and build the reply.
pub fn respond(
    message: &FrameMessage,
    frame: &Frame,
    detector: &SharedDetector,
    engine: &DetectParams,
) -> Result<FrameResponse> {
    let raw = {
        let mut backend = detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        backend.detect(frame, engine)?
    };
    let size = frame.size();
    let detections = raw
        .iter()
        .filter(|r| r.confidence >= message.confidence)
        .map(|r| BoxScore {
            bbox: to_origin_size(r, size),
            score: r.confidence,
        })
        .collect();
    Ok(FrameResponse {
        camera_id: message.camera_id,
        detections,
        frame_width: frame.width,
        frame_height: frame.height,
        timestamp: message.timestamp.clone(),
    })
}

/// Handle one text message.
///
/// `Ok(None)` means nothing is sent back: the message was not a frame, or it
/// was malformed (logged). An error means inference itself failed and the
/// connection should be dropped.
pub fn handle_text(
    text: &str,
    detector: &SharedDetector,
    engine: &DetectParams,
) -> Result<Option<FrameResponse>> {
    let message = match parse_message(text) {
        Ok(Inbound::Frame(message)) => message,
        Ok(Inbound::Ignored(kind)) => {
            log::debug!("ignoring message of type {:?}", kind);
            return Ok(None);
        }
        Err(err) => {
            log::warn!("dropping malformed message: {:#}", err);
            return Ok(None);
        }
    };
    let frame = match decode_frame(&message) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("failed to decode frame from camera {}: {:#}", message.camera_id, err);
            return Ok(None);
        }
    };
    respond(&message, &frame, detector, engine).map(Some)
}
