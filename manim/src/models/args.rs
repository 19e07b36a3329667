use crate::models::quality::Quality;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Keeps the renderer's own console quiet; its log goes to a file under the media directory.
pub const QUIET_FLAG: &str = "--log_to_file";

// ref: https://docs.manim.community/en/stable/guides/configuration.html
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    file: PathBuf, // required
    scene: String, // required
    pub quality: Quality,
    pub preview: bool,
    pub transparent: bool,
    pub save_last_frame: bool,
    pub gif: bool,
}

impl Args {
    pub fn new(file: impl AsRef<Path>, scene: impl Into<String>, quality: Quality) -> Self {
        Args {
            file: file.as_ref().to_path_buf(),
            scene: scene.into(),
            quality,
            preview: false,
            transparent: false,
            save_last_frame: false,
            gif: false,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn scene(&self) -> &str {
        &self.scene
    }

    /// Argument list following the executable. Order is fixed:
    /// quality, quiet flag, file, scene, then the optional toggles.
    pub fn create_arg_list(&self) -> Vec<String> {
        let mut col = vec![
            self.quality.flag().to_owned(),
            QUIET_FLAG.to_owned(),
            self.file.to_string_lossy().to_string(),
            self.scene.clone(),
        ];

        if self.preview {
            col.push("-p".to_owned());
        }
        if self.transparent {
            col.push("-t".to_owned());
        }
        if self.save_last_frame {
            col.push("-s".to_owned());
        }
        if self.gif {
            col.push("--gif".to_owned());
        }

        col
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_template() {
        let args = Args::new("scene.py", "KirchhoffsLaws", Quality::High);
        assert_eq!(
            args.create_arg_list(),
            vec!["-qh", "--log_to_file", "scene.py", "KirchhoffsLaws"]
        );
    }

    #[test]
    fn optional_flags_follow_scene_in_order() {
        let mut args = Args::new("waya.py", "FluidSimulation", Quality::Low);
        args.gif = true;
        args.preview = true;
        args.save_last_frame = true;
        args.transparent = true;
        assert_eq!(
            args.create_arg_list(),
            vec![
                "-ql",
                "--log_to_file",
                "waya.py",
                "FluidSimulation",
                "-p",
                "-t",
                "-s",
                "--gif"
            ]
        );
    }
}
