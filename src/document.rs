//! Per-video bounding-box document.
//!
//! Serialized layout (`<video-stem>_boxes.json`):
//!
//! ```json
//! {
//!   "video_info": {"name": "...", "width": 640, "height": 480, "fps": 30.0,
//!                  "total_frames": 300, "frame_interval": 15},
//!   "frames": {
//!     "0": {"boxes": [[x1, y1, x2, y2]], "confidences": [0.87], "is_keyframe": true},
//!     "1": {"boxes": [[x1, y1, x2, y2]], "confidences": [0.87], "is_keyframe": false}
//!   }
//! }
//! ```
//!
//! Frame keys are written in ascending numeric order. Reading a document back
//! requires the keys to be exactly `0..n`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::frame::FrameSize;
use crate::normalize::{Detection, PixelBox};
use crate::sampler::FrameRecord;

/// File name suffix of bounding-box documents.
pub const BOXES_SUFFIX: &str = "_boxes.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: u64,
    pub frame_interval: u32,
}

/// Deserializing checks that every box fits the frame and that
/// `total_frames` matches the frame table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocumentParts")]
pub struct VideoDocument {
    pub video_info: VideoInfo,
    pub frames: FrameTable,
}

#[derive(Deserialize)]
struct DocumentParts {
    video_info: VideoInfo,
    frames: FrameTable,
}

impl TryFrom<DocumentParts> for VideoDocument {
    type Error = String;

    fn try_from(parts: DocumentParts) -> Result<Self, String> {
        let DocumentParts { video_info, frames } = parts;
        if frames.len() as u64 != video_info.total_frames {
            return Err(format!(
                "total_frames is {} but the document has {} frames",
                video_info.total_frames,
                frames.len()
            ));
        }
        let size = FrameSize::new(video_info.width, video_info.height);
        for record in frames.iter() {
            if let Some(det) = record.detections.iter().find(|d| !d.bbox.fits(size)) {
                return Err(format!(
                    "frame {} box {:?} does not fit the {}x{} frame",
                    record.index,
                    <[u32; 4]>::from(det.bbox),
                    size.width,
                    size.height
                ));
            }
        }
        Ok(Self { video_info, frames })
    }
}

impl VideoDocument {
    /// Random access by frame number.
    pub fn frame(&self, index: u64) -> Option<&FrameRecord> {
        self.frames.get(index)
    }

    pub fn keyframe_count(&self) -> usize {
        self.frames.iter().filter(|r| r.is_keyframe).count()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid bounding-box document {}", path.display()))
    }
}

/// Write pretty-printed JSON. The file appears only once fully written;
/// on failure no temporary file is left behind.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let result = write_tmp(&tmp, value).and_then(|()| {
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move {} into place", path.display()))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_tmp<T: Serialize>(tmp: &Path, value: &T) -> Result<()> {
    let file = File::create(tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize {}", tmp.display()))?;
    writer.flush()?;
    Ok(())
}

/// `<out_dir>/<video-stem>_boxes.json`
pub fn boxes_path(out_dir: &Path, video: &Path) -> Result<PathBuf> {
    let stem = video
        .file_stem()
        .ok_or_else(|| anyhow!("video path {} has no file name", video.display()))?;
    Ok(out_dir.join(format!("{}{}", stem.to_string_lossy(), BOXES_SUFFIX)))
}

/// Dense frame table: entry `i` is the record of frame `i`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameTable(Vec<FrameRecord>);

impl FrameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the record of the next frame.
    pub fn push(&mut self, record: FrameRecord) -> Result<()> {
        let expected = self.0.len() as u64;
        if record.index != expected {
            bail!(
                "frame table expected frame {}, got {}",
                expected,
                record.index
            );
        }
        self.0.push(record);
        Ok(())
    }

    pub fn get(&self, index: u64) -> Option<&FrameRecord> {
        usize::try_from(index).ok().and_then(|i| self.0.get(i))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameRecord> {
        self.0.iter()
    }
}

#[derive(Serialize, Deserialize)]
struct FrameEntry {
    boxes: Vec<PixelBox>,
    confidences: Vec<f32>,
    is_keyframe: bool,
}

impl FrameEntry {
    fn from_record(record: &FrameRecord) -> Self {
        Self {
            boxes: record.detections.iter().map(|d| d.bbox).collect(),
            confidences: record.detections.iter().map(|d| d.confidence).collect(),
            is_keyframe: record.is_keyframe,
        }
    }

    fn into_record(self, index: u64) -> Result<FrameRecord, String> {
        if self.boxes.len() != self.confidences.len() {
            return Err(format!(
                "frame {} has {} boxes but {} confidences",
                index,
                self.boxes.len(),
                self.confidences.len()
            ));
        }
        let detections = self
            .boxes
            .into_iter()
            .zip(self.confidences)
            .map(|(bbox, confidence)| Detection { bbox, confidence })
            .collect();
        Ok(FrameRecord {
            index,
            is_keyframe: self.is_keyframe,
            detections,
        })
    }
}

impl Serialize for FrameTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in &self.0 {
            map.serialize_entry(&record.index.to_string(), &FrameEntry::from_record(record))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FrameTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FrameTableVisitor)
    }
}

struct FrameTableVisitor;

impl<'de> Visitor<'de> for FrameTableVisitor {
    type Value = FrameTable;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from frame index strings to frame records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FrameTable, A::Error> {
        let mut entries: BTreeMap<u64, FrameEntry> = BTreeMap::new();
        while let Some((key, entry)) = access.next_entry::<String, FrameEntry>()? {
            let index: u64 = key
                .parse()
                .ok()
                .filter(|i: &u64| i.to_string() == key)
                .ok_or_else(|| de::Error::custom(format!("invalid frame key '{}'", key)))?;
            if entries.insert(index, entry).is_some() {
                return Err(de::Error::custom(format!("duplicate frame key '{}'", key)));
            }
        }

        let mut records = Vec::with_capacity(entries.len());
        for (expected, (index, entry)) in entries.into_iter().enumerate() {
            if index != expected as u64 {
                return Err(de::Error::custom(format!(
                    "frame keys are not dense: missing frame {}",
                    expected
                )));
            }
            records.push(entry.into_record(index).map_err(de::Error::custom)?);
        }
        Ok(FrameTable(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> VideoDocument {
        let mut frames = FrameTable::new();
        let det = Detection {
            bbox: PixelBox::from([10, 20, 110, 220]),
            confidence: 0.875,
        };
        for index in 0..12u64 {
            frames
                .push(FrameRecord {
                    index,
                    is_keyframe: index % 5 == 0,
                    detections: vec![det],
                })
                .unwrap();
        }
        VideoDocument {
            video_info: VideoInfo {
                name: "lobby.mp4".to_string(),
                width: 640,
                height: 480,
                fps: 29.97,
                total_frames: 12,
                frame_interval: 5,
            },
            frames,
        }
    }

    #[test]
    fn keys_are_written_in_numeric_order() {
        let json = serde_json::to_string(&sample_document()).unwrap();
        let pos2 = json.find("\"2\":").unwrap();
        let pos10 = json.find("\"10\":").unwrap();
        assert!(pos2 < pos10);
        assert!(json.contains(r#""boxes":[[10,20,110,220]]"#));
        assert!(json.contains(r#""confidences":[0.875]"#));
    }

    #[test]
    fn round_trip_keeps_every_frame_key() {
        let doc = sample_document();
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: VideoDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);

        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        let mut keys: Vec<u64> = raw["frames"]
            .as_object()
            .unwrap()
            .keys()
            .map(|k| k.parse().unwrap())
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..doc.video_info.total_frames).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_gaps_and_bad_keys() {
        let gap = r#"{"0":{"boxes":[],"confidences":[],"is_keyframe":true},
                      "2":{"boxes":[],"confidences":[],"is_keyframe":false}}"#;
        assert!(serde_json::from_str::<FrameTable>(gap).is_err());

        let padded = r#"{"00":{"boxes":[],"confidences":[],"is_keyframe":true}}"#;
        assert!(serde_json::from_str::<FrameTable>(padded).is_err());

        let dup = r#"{"0":{"boxes":[],"confidences":[],"is_keyframe":true},
                      "0":{"boxes":[],"confidences":[],"is_keyframe":true}}"#;
        assert!(serde_json::from_str::<FrameTable>(dup).is_err());
    }

    #[test]
    fn rejects_mismatched_confidences() {
        let json = r#"{"0":{"boxes":[[0,0,1,1]],"confidences":[],"is_keyframe":true}}"#;
        assert!(serde_json::from_str::<FrameTable>(json).is_err());
    }

    fn document_json(boxes: &str) -> String {
        format!(
            r#"{{"video_info":{{"name":"a.mp4","width":10,"height":10,"fps":25.0,
                "total_frames":1,"frame_interval":5}},
               "frames":{{"0":{{"boxes":{},"confidences":[0.9],"is_keyframe":true}}}}}}"#,
            boxes
        )
    }

    #[test]
    fn rejects_boxes_outside_the_frame() {
        let inverted = document_json("[[9,0,2,5]]");
        assert!(serde_json::from_str::<VideoDocument>(&inverted).is_err());

        let too_tall = document_json("[[0,0,2,500]]");
        assert!(serde_json::from_str::<VideoDocument>(&too_tall).is_err());

        let edge = document_json("[[0,0,10,10]]");
        let doc: VideoDocument = serde_json::from_str(&edge).unwrap();
        assert_eq!(doc.frame(0).unwrap().detections[0].bbox.width(), 10);
    }

    #[test]
    fn rejects_total_frames_mismatch() {
        let json =
            document_json("[[0,0,1,1]]").replace(r#""total_frames":1"#, r#""total_frames":3"#);
        assert!(serde_json::from_str::<VideoDocument>(&json).is_err());
    }

    #[test]
    fn read_from_rejects_invalid_boxes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad_boxes.json");
        std::fs::write(&path, document_json("[[9,0,2,500]]"))?;
        assert!(VideoDocument::read_from(&path).is_err());
        Ok(())
    }

    #[test]
    fn failed_write_leaves_no_temp_file() -> Result<()> {
        struct Unserializable;
        impl Serialize for Unserializable {
            fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("refused"))
            }
        }

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip_boxes.json");
        assert!(write_json(&path, &Unserializable).is_err());
        assert!(!path.exists());
        assert!(!dir.path().join("clip_boxes.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn push_enforces_density() {
        let mut table = FrameTable::new();
        let record = |index| FrameRecord {
            index,
            is_keyframe: true,
            detections: Vec::new(),
        };
        assert!(table.push(record(1)).is_err());
        assert!(table.push(record(0)).is_ok());
        assert!(table.push(record(1)).is_ok());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn output_path_uses_the_video_stem() {
        let path = boxes_path(Path::new("/out"), Path::new("/videos/fight/Fighting005_x264.mp4"))
            .unwrap();
        assert_eq!(path, PathBuf::from("/out/Fighting005_x264_boxes.json"));
    }

    #[test]
    fn write_then_read_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("lobby_boxes.json");
        let doc = sample_document();
        doc.write_to(&path)?;
        assert!(!dir.path().join("lobby_boxes.json.tmp").exists());
        assert_eq!(VideoDocument::read_from(&path)?, doc);
        assert_eq!(doc.keyframe_count(), 3);
        assert_eq!(doc.frame(11).map(|r| r.is_keyframe), Some(false));
        Ok(())
    }
}
