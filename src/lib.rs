/*
    Two ways in:
    - no arguments, or --gui, opens the configuration form.
    - anything else is handled on the command line, including --scan which only lists scenes.
*/
use clap::Parser;
use dotenv::dotenv;
use manim::Quality;
use models::app_setting::AppSetting;
use services::{cli_app::CliApp, gui_app::GuiApp};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub mod models;
pub mod services;

const DEFAULT_LOG_FILTER: &str = "manim_launcher_lib=info,manim=info";

// every quality flag overrides the others, the last one given wins
const QUALITY_FLAGS: [&str; 5] = [
    "quality",
    "quality_low",
    "quality_medium",
    "quality_high",
    "quality_4k",
];

#[derive(Parser, Debug, Default)]
#[command(name = "manim-launcher")]
#[command(version = "0.1.0")]
#[command(about = "Render manim scenes from a script, one at a time or in parallel.")]
pub struct Cli {
    /// Quality preset: -ql 480p15, -qm 720p30, -qh 1080p60 [default], -qk 2160p60
    #[arg(short = 'q', value_name = "l|m|h|k", overrides_with_all = QUALITY_FLAGS)]
    pub quality: Option<Quality>,

    /// Low quality (480p15)
    #[arg(long = "quality_low", overrides_with_all = QUALITY_FLAGS)]
    pub quality_low: bool,

    /// Medium quality (720p30)
    #[arg(long = "quality_medium", overrides_with_all = QUALITY_FLAGS)]
    pub quality_medium: bool,

    /// High quality (1080p60) [default]
    #[arg(long = "quality_high", overrides_with_all = QUALITY_FLAGS)]
    pub quality_high: bool,

    /// 4K quality (2160p60)
    #[arg(long = "quality_4k", overrides_with_all = QUALITY_FLAGS)]
    pub quality_4k: bool,

    /// Scene names to render, every scene in the file when omitted
    pub scenes: Vec<String>,

    /// Preview after rendering
    #[arg(short, long)]
    pub preview: bool,

    /// Script to render
    #[arg(short, long, default_value = "scene.py")]
    pub file: PathBuf,

    /// Render with a transparent background
    #[arg(long)]
    pub transparent: bool,

    /// Only save the last frame
    #[arg(long = "save_last_frame")]
    pub save_last_frame: bool,

    /// Also export a GIF
    #[arg(long)]
    pub gif: bool,

    /// List the scenes found in the file and exit
    #[arg(long)]
    pub scan: bool,

    /// Render several scenes at once
    #[arg(long)]
    pub parallel: bool,

    /// Worker count for --parallel [default: logical CPU count]
    #[arg(long)]
    pub workers: Option<usize>,

    /// Enable the renderer's own multiprocessing
    #[arg(long = "manim-multiprocessing")]
    pub manim_multiprocessing: bool,

    /// Open the configuration form
    #[arg(long)]
    pub gui: bool,

    /// Renderer executable to invoke
    #[arg(long, value_name = "PATH")]
    pub manim: Option<PathBuf>,

    /// Directory the renderer writes media into
    #[arg(long = "media-dir", value_name = "DIR")]
    pub media_dir: Option<PathBuf>,

    /// Show the fixed one-step-per-second progress ticker instead of the renderer's own progress
    #[arg(long = "simulated-progress")]
    pub simulated_progress: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Quality flags override each other, so at most one is still set after parsing:
    /// the last one given.
    pub fn resolved_quality(&self) -> Option<Quality> {
        let flags = [
            (self.quality_low, Quality::Low),
            (self.quality_medium, Quality::Medium),
            (self.quality_high, Quality::High),
            (self.quality_4k, Quality::FourK),
        ];
        flags
            .iter()
            .rev()
            .find(|(set, _)| *set)
            .map(|(_, quality)| *quality)
            .or(self.quality)
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Entry point for the binary. Returns the process exit code.
pub fn run() -> anyhow::Result<i32> {
    dotenv().ok();
    init_tracing();

    let settings = AppSetting::load();

    // no arguments at all means the form
    if std::env::args_os().len() <= 1 {
        return GuiApp::run(settings).map(|_| 0);
    }

    let cli = Cli::parse();
    if cli.gui {
        return GuiApp::run(settings).map(|_| 0);
    }

    CliApp::new(settings).run(cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("manim-launcher").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn short_quality_flags() {
        assert_eq!(parse(&["-ql"]).resolved_quality(), Some(Quality::Low));
        assert_eq!(parse(&["-qm"]).resolved_quality(), Some(Quality::Medium));
        assert_eq!(parse(&["-qk"]).resolved_quality(), Some(Quality::FourK));
        assert_eq!(parse(&["--scan"]).resolved_quality(), None);
    }

    #[test]
    fn long_quality_flags() {
        assert_eq!(
            parse(&["--quality_4k"]).resolved_quality(),
            Some(Quality::FourK)
        );
        assert_eq!(
            parse(&["-ql", "--quality_medium"]).resolved_quality(),
            Some(Quality::Medium)
        );
    }

    #[test]
    fn last_quality_flag_wins() {
        assert_eq!(parse(&["-ql", "-qh"]).resolved_quality(), Some(Quality::High));
        assert_eq!(
            parse(&["--quality_4k", "-ql"]).resolved_quality(),
            Some(Quality::Low)
        );
        assert_eq!(
            parse(&["--quality_4k", "--quality_low"]).resolved_quality(),
            Some(Quality::Low)
        );
        assert_eq!(
            parse(&["--quality_low", "--quality_low"]).resolved_quality(),
            Some(Quality::Low)
        );

        let cli = parse(&["-qk", "--quality_medium", "-ql"]);
        assert!(!cli.quality_medium);
        assert_eq!(cli.quality, Some(Quality::Low));
    }

    #[test]
    fn scenes_and_toggles() {
        let cli = parse(&[
            "-f",
            "waya.py",
            "FluidSimulation",
            "WaterDropEffect",
            "-p",
            "--transparent",
            "--save_last_frame",
            "--gif",
            "--parallel",
            "--workers",
            "4",
            "--manim-multiprocessing",
        ]);
        assert_eq!(cli.file, PathBuf::from("waya.py"));
        assert_eq!(cli.scenes, vec!["FluidSimulation", "WaterDropEffect"]);
        assert!(cli.preview && cli.transparent && cli.save_last_frame && cli.gif);
        assert!(cli.parallel && cli.manim_multiprocessing);
        assert_eq!(cli.workers, Some(4));
        assert!(!cli.scan && !cli.gui);
    }

    #[test]
    fn defaults() {
        let cli = parse(&["--scan"]);
        assert_eq!(cli.file, PathBuf::from("scene.py"));
        assert!(cli.scenes.is_empty());
        assert_eq!(cli.workers, None);
    }

    #[test]
    fn rejects_unknown_quality() {
        assert!(Cli::try_parse_from(["manim-launcher", "-qx"]).is_err());
    }
}
