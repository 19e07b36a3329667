use crate::{
    models::{
        args::Args,
        options::{ProgressMode, RenderOptions},
        render_result::RenderResult,
        status::{ProgressSource, Status},
    },
    orchestrator::{SceneJob, SceneRunner},
    progress::{ProgressParser, SIMULATED_STEPS, SIMULATED_TICK},
};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::mpsc::Sender,
};
use thiserror::Error;
use tokio::{io::AsyncReadExt, process::Command, sync::watch};

pub const DEFAULT_EXECUTABLE: &str = "manim";

/// How many trailing stderr lines to show when no line looks like an error.
const TAIL_LINES: usize = 5;
const ERROR_MARKERS: [&str; 3] = ["ERROR", "Error", "Exception"];

#[derive(Debug, Error)]
pub enum ManimError {
    #[error("Unable to start {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("Unable to read renderer version from: {0}")]
    VersionNotFound(String),
    #[error("Renderer pipe was not captured")]
    MissingPipe,
    #[error("Worker pool failed: {0}")]
    Pool(String),
}

/// Renderer installation used to run scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manim {
    /// Path or bare command name of the renderer executable.
    pub executable: PathBuf,
    /// Reported by the executable itself, when it could be asked.
    pub version: Option<Version>,
}

impl Default for Manim {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTABLE)
    }
}

impl Manim {
    /// Create a handle without probing the executable.
    pub fn new(executable: impl AsRef<Path>) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            version: None,
        }
    }

    /// Create a handle and ask the executable for its version with `--version`.
    pub fn from_executable(executable: impl AsRef<Path>) -> Result<Self, ManimError> {
        let executable = executable.as_ref().to_path_buf();
        let output = std::process::Command::new(&executable)
            .arg("--version")
            .output()
            .map_err(|source| ManimError::Spawn {
                executable: executable.display().to_string(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = parse_version(&stdout)
            .ok_or_else(|| ManimError::VersionNotFound(stdout.trim().to_owned()))?;

        Ok(Self {
            executable,
            version: Some(version),
        })
    }

    /// Render one scene. Never fails: problems end up in the returned result.
    pub async fn render(
        &self,
        args: &Args,
        options: &RenderOptions,
        header: String,
        events: &Sender<Status>,
    ) -> RenderResult {
        match self.invoke(args, options, events).await {
            Ok((exit_code, stderr)) => classify(args.scene(), exit_code, header, &stderr),
            Err(e) => {
                RenderResult::failed(args.scene(), format!("{header}   Execution error: {e}\n"))
            }
        }
    }

    async fn invoke(
        &self,
        args: &Args,
        options: &RenderOptions,
        events: &Sender<Status>,
    ) -> Result<(Option<i32>, String), ManimError> {
        tokio::fs::create_dir_all(options.images_dir()).await?;
        tokio::fs::create_dir_all(options.videos_dir()).await?;

        let col = args.create_arg_list();
        let command = format!("{} {}", self.executable.display(), col.join(" "));
        tracing::debug!("{command}");
        let _ = events.send(Status::Log {
            message: format!("   $ {command}"),
        });

        let scene = args.scene().to_owned();
        let source = match options.progress {
            ProgressMode::Parsed => ProgressSource::Parsed,
            ProgressMode::Simulated => ProgressSource::Simulated,
        };
        let progress = |percent: u8, animation: Option<u32>, source: ProgressSource| {
            let _ = events.send(Status::SceneProgress {
                scene: scene.clone(),
                animation,
                percent,
                source,
            });
        };
        progress(0, None, source);

        let mut child = Command::new(&self.executable)
            .args(&col)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ManimError::Spawn {
                executable: self.executable.display().to_string(),
                source,
            })?;

        let mut stdout = child.stdout.take().ok_or(ManimError::MissingPipe)?;
        let mut stderr = child.stderr.take().ok_or(ManimError::MissingPipe)?;

        // stdout is drained so the renderer never blocks on a full pipe
        let drain = tokio::spawn(async move {
            let mut sink = Vec::new();
            let _ = stdout.read_to_end(&mut sink).await;
        });

        let (exited_tx, exited_rx) = watch::channel(false);
        let ticker = match options.progress {
            ProgressMode::Simulated => Some(tokio::spawn(simulate(
                scene.clone(),
                events.clone(),
                exited_rx,
            ))),
            ProgressMode::Parsed => None,
        };

        let mut parser = ProgressParser::default();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stderr.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            let updates = parser.feed(&chunk[..n]);
            if options.progress == ProgressMode::Parsed {
                for update in updates {
                    progress(update.percent, update.animation, ProgressSource::Parsed);
                }
            }
        }
        let (stderr_text, _) = parser.finish();

        let status = child.wait().await?;
        let _ = exited_tx.send(true);
        if let Some(ticker) = ticker {
            let _ = ticker.await;
        }
        let _ = drain.await;

        progress(100, None, source);

        Ok((status.code(), stderr_text))
    }
}

impl SceneRunner for Manim {
    fn run_scene(
        &self,
        job: SceneJob,
        events: Sender<Status>,
    ) -> impl Future<Output = RenderResult> + Send {
        async move {
            let args = job.options.args_for(&job.scene);
            let header = format!(
                "\n[{}/{}] Rendering: {}\n   Starting scene {}...\n",
                job.index, job.total, job.scene, job.scene
            );
            self.render(&args, &job.options, header, &events).await
        }
    }
}

// Cosmetic only: steps forward once a second whatever the renderer is doing.
async fn simulate(scene: String, events: Sender<Status>, mut exited: watch::Receiver<bool>) {
    for percent in SIMULATED_STEPS {
        tokio::select! {
            _ = tokio::time::sleep(SIMULATED_TICK) => {}
            _ = exited.changed() => return,
        }
        if *exited.borrow() {
            return;
        }
        let _ = events.send(Status::SceneProgress {
            scene: scene.clone(),
            animation: None,
            percent,
            source: ProgressSource::Simulated,
        });
    }
}

/// Exit code 0 is success. Anything else, including a missing code, is a failure.
pub fn classify(scene: &str, exit_code: Option<i32>, header: String, stderr: &str) -> RenderResult {
    let success = exit_code == Some(0);
    let mut output = header;
    if !success {
        match exit_code {
            Some(code) => output.push_str(&format!("   Render failed, exit code: {code}\n")),
            None => output.push_str("   Render failed, terminated by signal\n"),
        }
        let (matched, lines) = extract_diagnostics(stderr);
        if !matched && !lines.is_empty() {
            output.push_str("   Error details:\n");
        }
        for line in lines {
            output.push_str(&format!("   > {line}\n"));
        }
    }

    RenderResult {
        scene: scene.to_owned(),
        success,
        exit_code,
        output,
    }
}

/// Lines carrying an error marker, or the last few lines of stderr when none do.
/// The flag tells which of the two was returned.
pub fn extract_diagnostics(stderr: &str) -> (bool, Vec<String>) {
    let marked: Vec<String> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && ERROR_MARKERS.iter().any(|m| line.contains(m)))
        .map(str::to_owned)
        .collect();
    if !marked.is_empty() {
        return (true, marked);
    }

    let lines: Vec<&str> = stderr.trim().lines().collect();
    let tail = lines[lines.len().saturating_sub(TAIL_LINES)..]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    (false, tail)
}

fn parse_version(text: &str) -> Option<Version> {
    let re = Regex::new(r"v?(\d+\.\d+\.\d+)").ok()?;
    let caps = re.captures(text)?;
    Version::parse(caps.get(1)?.as_str()).ok()
}
