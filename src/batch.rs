//! Input discovery and the per-video batch driver.
//!
//! Each video is an independent unit of work. The driver runs them one after
//! another, records each outcome, and never lets one failure stop the rest.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glob::{MatchOptions, Pattern};

/// Videos whose names end with this are previously rendered overlays.
const RENDERED_SUFFIX: &str = "_boxes.mp4";

/// Category folders scanned by the annotation generator.
pub const ANNOTATION_CATEGORY_DIRS: [&str; 4] = [
    "usable_burglary",
    "usable_fight",
    "usable_shoplift",
    "usable_vandalism",
];

/// Outcome of one video.
#[derive(Debug)]
pub struct VideoOutcome {
    pub video: PathBuf,
    /// Written output file, or why the video was skipped.
    pub result: Result<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<VideoOutcome>,
}

impl BatchReport {
    pub fn written(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }

    pub fn failed(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.video.as_path())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Outputs written by more than one video; the last write wins.
    pub fn overwritten(&self) -> Vec<&Path> {
        let mut seen = HashSet::new();
        let mut repeated = Vec::new();
        for path in self.written() {
            if !seen.insert(path) && !repeated.contains(&path) {
                repeated.push(path);
            }
        }
        repeated
    }
}

/// Run `process` over every video, in order.
pub fn run_batch<F>(videos: &[PathBuf], mut process: F) -> BatchReport
where
    F: FnMut(&Path) -> Result<PathBuf>,
{
    let mut report = BatchReport::default();
    let mut outputs: HashMap<PathBuf, PathBuf> = HashMap::new();
    for (i, video) in videos.iter().enumerate() {
        log::info!("[{}/{}] {}", i + 1, videos.len(), video.display());
        let result = process(video);
        match &result {
            Ok(output) => {
                if let Some(previous) = outputs.insert(output.clone(), video.clone()) {
                    log::warn!(
                        "{} overwrote {}, written earlier for {}",
                        video.display(),
                        output.display(),
                        previous.display()
                    );
                }
            }
            Err(err) => log::error!("error processing {}: {:#}", video.display(), err),
        }
        report.outcomes.push(VideoOutcome {
            video: video.clone(),
            result,
        });
    }
    log::info!(
        "batch finished: {} written, {} failed",
        report.written().len(),
        report.failed().len()
    );
    report
}

/// Every `*.mp4` (any case) below `dir`, skipping rendered overlays. Sorted.
pub fn discover_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut videos: Vec<PathBuf> = glob_mp4(dir, "**/*.mp4")?
        .into_iter()
        .filter(|path| !is_rendered_overlay(path))
        .collect();
    videos.sort();
    Ok(videos)
}

/// `*.mp4` directly inside each known category folder of `footage_dir`.
pub fn discover_annotation_inputs(footage_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for category in ANNOTATION_CATEGORY_DIRS {
        let dir = footage_dir.join(category);
        if !dir.is_dir() {
            log::debug!("category folder {} not present", dir.display());
            continue;
        }
        let mut found = glob_mp4(&dir, "*.mp4")?;
        found.sort();
        videos.extend(found);
    }
    Ok(videos)
}

fn glob_mp4(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let dir_str = dir
        .to_str()
        .ok_or_else(|| anyhow!("directory {} is not valid UTF-8", dir.display()))?;
    let pattern = format!("{}/{}", Pattern::escape(dir_str), suffix);
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let mut paths = Vec::new();
    for entry in glob::glob_with(&pattern, options)
        .with_context(|| format!("invalid glob pattern {}", pattern))?
    {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(err) => log::warn!("skipping unreadable path: {}", err),
        }
    }
    Ok(paths)
}

fn is_rendered_overlay(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(RENDERED_SUFFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn discovers_mp4_recursively_without_overlays() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        touch(&root.join("fight/Fighting005_x264.mp4"));
        touch(&root.join("burglary/Burglary003_x264.MP4"));
        touch(&root.join("burglary/Burglary003_x264_boxes.mp4"));
        touch(&root.join("notes.txt"));

        let videos = discover_videos(root)?;
        assert_eq!(
            videos,
            vec![
                root.join("burglary/Burglary003_x264.MP4"),
                root.join("fight/Fighting005_x264.mp4"),
            ]
        );
        Ok(())
    }

    #[test]
    fn annotation_inputs_come_from_category_folders_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        touch(&root.join("usable_fight/a.mp4"));
        touch(&root.join("usable_fight/nested/b.mp4"));
        touch(&root.join("other/c.mp4"));
        touch(&root.join("usable_burglary/d.mp4"));

        let videos = discover_annotation_inputs(root)?;
        assert_eq!(
            videos,
            vec![root.join("usable_burglary/d.mp4"), root.join("usable_fight/a.mp4")]
        );
        Ok(())
    }

    #[test]
    fn batch_continues_past_failures() {
        let videos: Vec<PathBuf> = ["a.mp4", "b.mp4", "c.mp4"].iter().map(PathBuf::from).collect();
        let mut attempted = Vec::new();
        let report = run_batch(&videos, |video| {
            attempted.push(video.to_path_buf());
            if video == Path::new("b.mp4") {
                Err(anyhow!("corrupt header"))
            } else {
                Ok(video.with_extension("json"))
            }
        });

        assert_eq!(attempted, videos);
        assert_eq!(report.failed(), vec![Path::new("b.mp4")]);
        assert_eq!(report.written(), vec![Path::new("a.json"), Path::new("c.json")]);
        assert!(!report.all_succeeded());
        assert!(report.overwritten().is_empty());
    }

    #[test]
    fn same_stem_in_two_folders_is_reported_as_overwritten() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        for sub in ["a", "b", "c"] {
            fs::create_dir_all(root.join(sub))?;
        }
        fs::write(root.join("a/clip.mp4"), b"")?;
        fs::write(root.join("b/clip.mp4"), b"")?;
        fs::write(root.join("c/other.mp4"), b"")?;

        let videos = discover_videos(root)?;
        assert_eq!(videos.len(), 3);
        let out = root.join("out");
        let report = run_batch(&videos, |video| crate::document::boxes_path(&out, video));

        assert_eq!(report.written().len(), 3);
        let clip = out.join("clip_boxes.json");
        assert_eq!(report.overwritten(), vec![clip.as_path()]);
        Ok(())
    }
}
