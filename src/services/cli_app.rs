use crate::{models::app_setting::AppSetting, Cli};
use anyhow::Context;
use manim::{
    scan::scan_file_for_scenes, Manim, Orchestrator, ProgressMode, RenderOptions, RenderSummary,
    Status,
};
use std::{
    path::Path,
    sync::mpsc::{self, Receiver},
    thread,
};

pub struct CliApp {
    settings: AppSetting,
}

impl CliApp {
    pub fn new(settings: AppSetting) -> Self {
        Self { settings }
    }

    /// Handle a parsed command line. Returns the process exit code.
    pub fn run(self, cli: Cli) -> anyhow::Result<i32> {
        if cli.scan {
            return self.scan(&cli);
        }

        let scenes = if cli.scenes.is_empty() {
            scan_file_for_scenes(&cli.file)
        } else {
            cli.scenes.clone()
        };
        if scenes.is_empty() {
            eprintln!("\nNo scene classes found in {}!", cli.file.display());
            return Ok(1);
        }

        let options = self.build_options(&cli, scenes);
        let manim = self.manim(&cli);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Unable to start the async runtime")?;

        println!("\nStarting render... [{}]", options.quality);
        if options.parallel && options.max_workers > 1 {
            println!("Rendering with {} workers", options.max_workers);
        }
        tracing::debug!("\n{}", options.describe());

        let (tx, rx) = mpsc::channel();
        let json = cli.json;
        let printer = thread::spawn(move || print_events(rx, json));

        let orchestrator = Orchestrator::new(manim);
        let summary = runtime.block_on(orchestrator.render(options, tx));
        let _ = printer.join();

        self.report(&summary, json)?;
        Ok(summary.status_code())
    }

    fn scan(&self, cli: &Cli) -> anyhow::Result<i32> {
        let scenes = scan_file_for_scenes(&cli.file);
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&scenes)?);
        } else if scenes.is_empty() {
            println!("\nNo scene classes found in {}!", cli.file.display());
        } else {
            println!("\nScenes found in {}:", cli.file.display());
            for (i, scene) in scenes.iter().enumerate() {
                println!("  {}. {}", i + 1, scene);
            }
        }
        Ok(0)
    }

    /// Merge the command line over the saved settings.
    pub fn build_options(&self, cli: &Cli, scenes: Vec<String>) -> RenderOptions {
        let mut options = RenderOptions::new(&cli.file, scenes);
        options.quality = cli.resolved_quality().unwrap_or(self.settings.quality);
        options.preview = cli.preview;
        options.transparent = cli.transparent;
        options.save_last_frame = cli.save_last_frame;
        options.gif = cli.gif;
        options.parallel = cli.parallel;
        options.max_workers = cli.workers.unwrap_or(self.settings.workers);
        options.use_manim_multiprocessing = cli.manim_multiprocessing;
        options.progress = if cli.simulated_progress {
            ProgressMode::Simulated
        } else {
            self.settings.progress
        };
        options.media_dir = cli
            .media_dir
            .clone()
            .unwrap_or_else(|| self.settings.media_dir.clone());
        options
    }

    fn manim(&self, cli: &Cli) -> Manim {
        let executable = cli
            .manim
            .as_deref()
            .unwrap_or(self.settings.manim_executable.as_path());
        probe(executable)
    }

    fn report(&self, summary: &RenderSummary, json: bool) -> anyhow::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(summary)?);
        } else {
            println!("\n{}", summary.report());
        }
        Ok(())
    }
}

/// Ask the executable for its version. Rendering still goes ahead if it cannot answer.
pub fn probe(executable: &Path) -> Manim {
    match Manim::from_executable(executable) {
        Ok(manim) => {
            if let Some(version) = &manim.version {
                tracing::info!("Using manim {version} at {}", executable.display());
            }
            manim
        }
        Err(e) => {
            tracing::warn!("Could not query renderer version: {e}");
            Manim::new(executable)
        }
    }
}

fn print_events(rx: Receiver<Status>, json: bool) {
    while let Ok(status) = rx.recv() {
        match status {
            Status::SceneFinished(result) if !json => println!("{}", result.output),
            Status::FallBack { reason } => {
                eprintln!("Parallel render failed: {reason}");
                eprintln!("Falling back to rendering one scene at a time...");
            }
            Status::SceneProgress {
                scene,
                animation,
                percent,
                source,
            } => {
                tracing::trace!("[{scene}] {animation:?} {percent}% ({source:?})");
            }
            _ => {}
        }
    }
}
