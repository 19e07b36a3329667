use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Unknown quality tier: {0}")]
pub struct QualityError(String);

// ref: https://docs.manim.community/en/stable/guides/configuration.html#command-line-arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
    FourK,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Low,
        Quality::Medium,
        Quality::High,
        Quality::FourK,
    ];

    /// Flag handed to the renderer to pick this preset.
    pub fn flag(&self) -> &'static str {
        match self {
            Quality::Low => "-ql",
            Quality::Medium => "-qm",
            Quality::High => "-qh",
            Quality::FourK => "-qk",
        }
    }

    /// Directory name the renderer writes videos under for this preset.
    pub fn resolution_dir(&self) -> &'static str {
        match self {
            Quality::Low => "480p15",
            Quality::Medium => "720p30",
            Quality::High => "1080p60",
            Quality::FourK => "2160p60",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quality::Low => "Low (480p15)",
            Quality::Medium => "Medium (720p30)",
            Quality::High => "High (1080p60)",
            Quality::FourK => "4K (2160p60)",
        }
    }
}

impl FromStr for Quality {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l" | "low" => Ok(Quality::Low),
            "m" | "medium" => Ok(Quality::Medium),
            "h" | "high" => Ok(Quality::High),
            "k" | "4k" => Ok(Quality::FourK),
            _ => Err(QualityError(s.to_owned())),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_map_to_flags_and_resolutions() {
        let expected = [
            (Quality::Low, "-ql", "480p15"),
            (Quality::Medium, "-qm", "720p30"),
            (Quality::High, "-qh", "1080p60"),
            (Quality::FourK, "-qk", "2160p60"),
        ];
        for (quality, flag, dir) in expected {
            assert_eq!(quality.flag(), flag);
            assert_eq!(quality.resolution_dir(), dir);
        }
    }

    #[test]
    fn parses_short_letters() {
        assert_eq!("l".parse::<Quality>(), Ok(Quality::Low));
        assert_eq!("M".parse::<Quality>(), Ok(Quality::Medium));
        assert_eq!("h".parse::<Quality>(), Ok(Quality::High));
        assert_eq!("k".parse::<Quality>(), Ok(Quality::FourK));
        assert!("x".parse::<Quality>().is_err());
    }

    #[test]
    fn defaults_to_high() {
        assert_eq!(Quality::default(), Quality::High);
    }
}
