#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectParams, DetectorBackend};
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{ObjectClass, RawDetection};
use crate::frame::Frame;

/// Number of box coordinates ahead of the class scores in each YOLOv8 row.
const BOX_FIELDS: usize = 4;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// The model is expected to take `[1, 3, size, size]` RGB input scaled to
/// 0..1 and to emit `[1, 4 + classes, anchors]` with center/size boxes in
/// input pixels followed by per-class scores.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = image::imageops::resize(
            &image,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame: &Frame,
        params: &DetectParams,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= BOX_FIELDS {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }

        let class_column = BOX_FIELDS + params.class.coco_index() as usize;
        if class_column >= shape[1] {
            return Err(anyhow!(
                "model has {} classes, class index {} requested",
                shape[1] - BOX_FIELDS,
                params.class.coco_index()
            ));
        }

        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;
        let mut candidates = Vec::new();
        for anchor in 0..shape[2] {
            let score = view[[0, class_column, anchor]];
            if !score.is_finite() || score < params.confidence {
                continue;
            }
            let cx = view[[0, 0, anchor]];
            let cy = view[[0, 1, anchor]];
            let w = view[[0, 2, anchor]];
            let h = view[[0, 3, anchor]];
            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
                continue;
            }
            candidates.push(RawDetection {
                x1: (cx - w / 2.0) * scale_x,
                y1: (cy - h / 2.0) * scale_y,
                x2: (cx + w / 2.0) * scale_x,
                y2: (cy + h / 2.0) * scale_y,
                confidence: score,
                class: params.class,
            });
        }

        Ok(non_max_suppression(candidates, params.iou))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, _class: ObjectClass) -> bool {
        true
    }

    fn detect(&mut self, frame: &Frame, params: &DetectParams) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, params)
    }

    fn warm_up(&mut self) -> Result<()> {
        let frame = Frame::solid(self.input_size, self.input_size, [114, 114, 114]);
        self.detect(&frame, &DetectParams::person(1.0, 0.5)).map(|_| ())
    }
}
