use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::annotate::{self, AnnotateOptions};
use crate::boxes::{self, BoxOptions};
use crate::detect::DetectParams;
use crate::relay::{self, RelayConfig};

const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_MODEL_LABEL: &str = "YOLOv8n";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_VIDEOS_DIR: &str = "public/videos";
const DEFAULT_BOXES_DIR: &str = "public/bounding_boxes";
const DEFAULT_FOOTAGE_DIR: &str = "footage";
const DEFAULT_ANNOTATIONS_DIR: &str = "public/annotations";

/// Backend used when nothing is configured.
pub fn default_backend() -> &'static str {
    if cfg!(feature = "backend-tract") {
        "tract"
    } else {
        "contrast"
    }
}

#[derive(Debug, Deserialize, Default)]
struct ViewguardConfigFile {
    detector: Option<DetectorConfigFile>,
    server: Option<ServerConfigFile>,
    boxes: Option<BoxesConfigFile>,
    annotations: Option<AnnotationsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    addr: Option<String>,
    model_label: Option<String>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct BoxesConfigFile {
    videos_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    frame_interval: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationsConfigFile {
    footage_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    frame_skip: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ViewguardConfig {
    pub detector: DetectorSettings,
    pub server: ServerSettings,
    pub boxes: BoxSettings,
    pub annotations: AnnotationSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: String,
    pub model_label: String,
    pub confidence: f32,
    pub iou: f32,
}

#[derive(Debug, Clone)]
pub struct BoxSettings {
    pub videos_dir: PathBuf,
    pub output_dir: PathBuf,
    pub options: BoxOptions,
}

#[derive(Debug, Clone)]
pub struct AnnotationSettings {
    pub footage_dir: PathBuf,
    pub output_dir: PathBuf,
    pub options: AnnotateOptions,
}

impl Default for ViewguardConfig {
    fn default() -> Self {
        Self::from_file(ViewguardConfigFile::default())
    }
}

impl ViewguardConfig {
    /// Defaults, then the JSON file named by `VIEWGUARD_CONFIG`, then env.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VIEWGUARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ViewguardConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let server = file.server.unwrap_or_default();
        let boxes_file = file.boxes.unwrap_or_default();
        let annotations_file = file.annotations.unwrap_or_default();

        Self {
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| default_backend().to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            server: ServerSettings {
                addr: server
                    .addr
                    .unwrap_or_else(|| relay::DEFAULT_ADDR.to_string()),
                model_label: server
                    .model_label
                    .unwrap_or_else(|| DEFAULT_MODEL_LABEL.to_string()),
                confidence: server
                    .confidence
                    .unwrap_or(relay::DEFAULT_ENGINE_CONFIDENCE),
                iou: server.iou.unwrap_or(relay::DEFAULT_ENGINE_IOU),
            },
            boxes: BoxSettings {
                videos_dir: boxes_file
                    .videos_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_VIDEOS_DIR)),
                output_dir: boxes_file
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BOXES_DIR)),
                options: BoxOptions {
                    frame_interval: boxes_file
                        .frame_interval
                        .unwrap_or(boxes::DEFAULT_FRAME_INTERVAL),
                    confidence: boxes_file.confidence.unwrap_or(boxes::DEFAULT_CONFIDENCE),
                    iou: boxes_file.iou.unwrap_or(boxes::DEFAULT_IOU),
                },
            },
            annotations: AnnotationSettings {
                footage_dir: annotations_file
                    .footage_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FOOTAGE_DIR)),
                output_dir: annotations_file
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ANNOTATIONS_DIR)),
                options: AnnotateOptions {
                    frame_skip: annotations_file
                        .frame_skip
                        .unwrap_or(annotate::DEFAULT_FRAME_SKIP),
                    confidence: annotations_file
                        .confidence
                        .unwrap_or(annotate::DEFAULT_CONFIDENCE),
                    iou: annotations_file.iou.unwrap_or(annotate::DEFAULT_IOU),
                },
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("VIEWGUARD_ADDR") {
            if !addr.trim().is_empty() {
                self.server.addr = addr;
            }
        }
        if let Ok(backend) = std::env::var("VIEWGUARD_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var("VIEWGUARD_MODEL") {
            if !model.trim().is_empty() {
                self.detector.model_path = PathBuf::from(model);
            }
        }
        if let Ok(interval) = std::env::var("VIEWGUARD_FRAME_INTERVAL") {
            self.boxes.options.frame_interval = interval
                .trim()
                .parse()
                .map_err(|_| anyhow!("VIEWGUARD_FRAME_INTERVAL must be a positive integer"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.boxes.options.frame_interval == 0 {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        if self.annotations.options.frame_skip == 0 {
            return Err(anyhow!("annotation frame skip must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        for (name, value) in [
            ("server confidence", self.server.confidence),
            ("server iou", self.server.iou),
            ("boxes confidence", self.boxes.options.confidence),
            ("boxes iou", self.boxes.options.iou),
            ("annotations confidence", self.annotations.options.confidence),
            ("annotations iou", self.annotations.options.iou),
        ] {
            check_unit(name, value)?;
        }
        Ok(())
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            addr: self.server.addr.clone(),
            model_label: self.server.model_label.clone(),
            engine: DetectParams::person(self.server.confidence, self.server.iou),
        }
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<ViewguardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
