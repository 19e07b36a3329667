use crate::models::{args::Args, quality::Quality};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MEDIA_DIR: &str = "media";

/// Where per-scene progress comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressMode {
    /// Read the renderer's progress bars from its stderr.
    #[default]
    Parsed,
    /// Fixed cosmetic ticker (10..95, one step a second). Carries no information about the render.
    Simulated,
}

/// Everything one render run needs. Built once from the form or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub file: PathBuf,
    pub scenes: Vec<String>,
    pub quality: Quality,
    pub preview: bool,
    pub transparent: bool,
    pub save_last_frame: bool,
    pub gif: bool,
    pub parallel: bool,
    pub max_workers: usize,
    /// Recorded for the run report; the renderer has no matching switch.
    pub use_manim_multiprocessing: bool,
    pub progress: ProgressMode,
    pub media_dir: PathBuf,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            file: PathBuf::from("scene.py"),
            scenes: Vec::new(),
            quality: Quality::default(),
            preview: false,
            transparent: false,
            save_last_frame: false,
            gif: false,
            parallel: false,
            max_workers: default_workers(),
            use_manim_multiprocessing: false,
            progress: ProgressMode::default(),
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
        }
    }
}

/// Logical processor count, or 1 if it cannot be queried.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RenderOptions {
    pub fn new(file: impl AsRef<Path>, scenes: Vec<String>) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            scenes,
            ..Default::default()
        }
    }

    /// File name without directory or extension, used for media sub-directories.
    pub fn file_stem(&self) -> String {
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn args_for(&self, scene: &str) -> Args {
        let mut args = Args::new(&self.file, scene, self.quality);
        args.preview = self.preview;
        args.transparent = self.transparent;
        args.save_last_frame = self.save_last_frame;
        args.gif = self.gif;
        args
    }

    /// Whether the run qualifies for the worker pool at all.
    pub fn wants_pool(&self) -> bool {
        self.parallel && self.max_workers > 1 && self.scenes.len() > 1
    }

    pub fn images_dir(&self) -> PathBuf {
        self.media_dir.join("images").join(self.file_stem())
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.media_dir.join("videos").join(self.file_stem())
    }

    /// Where the renderer is expected to put the videos. Derived, never checked on disk.
    pub fn output_path(&self) -> String {
        format!(
            "{}/videos/{}/{}/",
            self.media_dir.to_string_lossy(),
            self.file_stem(),
            self.quality.resolution_dir()
        )
    }

    /// Human readable recap, shown before a render starts.
    pub fn describe(&self) -> String {
        let mark = |b: bool| if b { "[x]" } else { "[ ]" };
        format!(
            "File: {}\nScenes: {}\nQuality: {}\n{} Preview after render\n{} Transparent background\n{} Save last frame only\n{} Export GIF\n{} Parallel render ({} workers)\n{} Renderer multiprocessing",
            self.file.display(),
            self.scenes.join(", "),
            self.quality,
            mark(self.preview),
            mark(self.transparent),
            mark(self.save_last_frame),
            mark(self.gif),
            mark(self.parallel),
            self.max_workers,
            mark(self.use_manim_multiprocessing),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_uses_stem_and_resolution() {
        let mut options = RenderOptions::new("content/waya.py", vec!["FluidSimulation".into()]);
        options.quality = Quality::Medium;
        assert_eq!(options.output_path(), "media/videos/waya/720p30/");
        assert_eq!(options.images_dir(), PathBuf::from("media/images/waya"));
        assert_eq!(options.videos_dir(), PathBuf::from("media/videos/waya"));
    }

    #[test]
    fn pool_needs_flag_workers_and_several_scenes() {
        let mut options = RenderOptions::new("scene.py", vec!["A".into(), "B".into()]);
        options.max_workers = 4;
        assert!(!options.wants_pool());

        options.parallel = true;
        assert!(options.wants_pool());

        options.max_workers = 1;
        assert!(!options.wants_pool());

        options.max_workers = 4;
        options.scenes.truncate(1);
        assert!(!options.wants_pool());
    }

    #[test]
    fn args_carry_toggles() {
        let mut options = RenderOptions::new("scene.py", vec![]);
        options.gif = true;
        options.transparent = true;
        let args = options.args_for("KirchhoffsLaws");
        assert!(args.gif && args.transparent);
        assert!(!args.preview && !args.save_last_frame);
        assert_eq!(args.scene(), "KirchhoffsLaws");
    }

    #[test]
    fn survives_json() {
        let options = RenderOptions::new("scene.py", vec!["A".into()]);
        let json = serde_json::to_string(&options).unwrap();
        let back: RenderOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, back);
    }
}
