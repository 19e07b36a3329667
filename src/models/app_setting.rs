use super::error::AppError;
use manim::{models::options::default_workers, ProgressMode, Quality};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// path to config file name.
const SETTINGS_PATH: &str = "ManimLauncher/";
const SETTINGS_FILE_NAME: &str = "AppSetting.json";

/// User preferences kept between runs. Command line flags override them for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSetting {
    /// Renderer executable, a bare command name is looked up on PATH.
    pub manim_executable: PathBuf,
    /// Root the renderer writes `images/` and `videos/` under.
    pub media_dir: PathBuf,
    pub quality: Quality,
    pub workers: usize,
    pub progress: ProgressMode,
}

impl Default for AppSetting {
    fn default() -> Self {
        Self {
            manim_executable: PathBuf::from(manim::manim::DEFAULT_EXECUTABLE),
            media_dir: PathBuf::from(manim::models::options::DEFAULT_MEDIA_DIR),
            quality: Quality::default(),
            workers: default_workers(),
            progress: ProgressMode::default(),
        }
    }
}

impl AppSetting {
    fn get_config_path() -> Result<PathBuf, AppError> {
        let path = dirs::config_dir()
            .ok_or(AppError::NoConfigDir)?
            .join(SETTINGS_PATH);
        fs::create_dir_all(&path)?;
        Ok(path.join(SETTINGS_FILE_NAME))
    }

    /// Save the settings to the user's config directory.
    pub fn save(&self) -> Result<(), AppError> {
        self.save_to(Self::get_config_path()?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let data = serde_json::to_string_pretty(&self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Load the settings from the user's config directory.
    /// A missing or unreadable file gives the defaults, which are written back.
    pub fn load() -> AppSetting {
        match Self::get_config_path() {
            Ok(path) => Self::load_from(path),
            Err(e) => {
                tracing::warn!("Using default settings: {e}");
                AppSetting::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> AppSetting {
        let path = path.as_ref();
        match fs::read_to_string(path)
            .map_err(AppError::from)
            .and_then(|data| Ok(serde_json::from_str::<AppSetting>(&data)?))
        {
            Ok(settings) => settings,
            Err(e) => {
                tracing::info!("Creating new settings at {} ({e})", path.display());
                let data = AppSetting::default();
                if let Err(e) = data.save_to(path) {
                    tracing::warn!("Unable to save settings: {e}");
                }
                data
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("manim-launcher-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn round_trip() {
        let dir = scratch("round-trip");
        let path = dir.join(SETTINGS_FILE_NAME);
        let settings = AppSetting {
            manim_executable: PathBuf::from("/opt/manim/bin/manim"),
            quality: Quality::FourK,
            workers: 3,
            progress: ProgressMode::Simulated,
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(AppSetting::load_from(&path), settings);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn corrupt_file_is_replaced_with_defaults() {
        let dir = scratch("corrupt");
        let path = dir.join(SETTINGS_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        let settings = AppSetting::load_from(&path);
        assert_eq!(settings, AppSetting::default());
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("manim_executable"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = scratch("partial");
        let path = dir.join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{ "quality": "Low" }"#).unwrap();
        let settings = AppSetting::load_from(&path);
        assert_eq!(settings.quality, Quality::Low);
        assert_eq!(settings.media_dir, PathBuf::from("media"));
        fs::remove_dir_all(dir).unwrap();
    }
}
