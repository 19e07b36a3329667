/*
    Configuration form. The render itself runs on a background thread with its own runtime;
    progress comes back over a channel that the UI thread drains on every frame.
*/
use super::cli_app::probe;
use crate::models::app_setting::AppSetting;
use manim::{
    models::options::default_workers,
    scan::{scan_directory_for_files, scan_file_for_scenes},
    Orchestrator, ProgressMode, ProgressSource, Quality, RenderOptions, RenderSummary, Status,
};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    thread::{self, JoinHandle},
    time::Duration,
};

const MAX_WORKERS: usize = 32;
const REPAINT_INTERVAL: Duration = Duration::from_millis(100);
const SUCCESS_COLOR: egui::Color32 = egui::Color32::from_rgb(76, 175, 80);
const FAILURE_COLOR: egui::Color32 = egui::Color32::from_rgb(255, 82, 82);

/// Everything the form edits, kept apart from egui so it can be exercised directly.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub files: Vec<PathBuf>,
    pub file: Option<PathBuf>,
    pub scenes: Vec<String>,
    pub selected: Vec<bool>,
    pub quality: Quality,
    pub preview: bool,
    pub transparent: bool,
    pub save_last_frame: bool,
    pub gif: bool,
    pub parallel: bool,
    pub max_workers: usize,
    pub use_manim_multiprocessing: bool,
    pub progress: ProgressMode,
}

impl FormState {
    pub fn new(settings: &AppSetting) -> Self {
        Self {
            files: Vec::new(),
            file: None,
            scenes: Vec::new(),
            selected: Vec::new(),
            quality: settings.quality,
            preview: false,
            transparent: false,
            save_last_frame: false,
            gif: false,
            parallel: false,
            max_workers: settings.workers.clamp(1, MAX_WORKERS),
            use_manim_multiprocessing: false,
            progress: settings.progress,
        }
    }

    /// Re-list the scripts in `dir`, keeping the current choice when it is still there.
    pub fn refresh_files(&mut self, dir: impl AsRef<Path>) {
        self.files = scan_directory_for_files(dir);
        let keep = self
            .file
            .as_ref()
            .is_some_and(|file| self.files.contains(file));
        if !keep {
            let first = self.files.first().cloned();
            self.set_file(first);
        }
    }

    /// Select a script and rescan its scenes. All selections are cleared.
    pub fn set_file(&mut self, file: Option<PathBuf>) {
        self.scenes = file.as_ref().map(scan_file_for_scenes).unwrap_or_default();
        self.selected = vec![false; self.scenes.len()];
        self.file = file;
    }

    pub fn select_all(&mut self) {
        self.selected.iter_mut().for_each(|s| *s = true);
    }

    pub fn deselect_all(&mut self) {
        self.selected.iter_mut().for_each(|s| *s = false);
    }

    pub fn selected_scenes(&self) -> Vec<String> {
        self.scenes
            .iter()
            .zip(&self.selected)
            .filter(|(_, selected)| **selected)
            .map(|(scene, _)| scene.clone())
            .collect()
    }

    /// Logical processors doubled, as offered by the form's shortcut button.
    pub fn cpu_shortcut() -> usize {
        (default_workers() * 2).min(MAX_WORKERS)
    }

    /// None when there is nothing to render.
    pub fn to_options(&self, settings: &AppSetting) -> Option<RenderOptions> {
        let file = self.file.as_ref()?;
        let scenes = self.selected_scenes();
        if scenes.is_empty() {
            return None;
        }
        let mut options = RenderOptions::new(file, scenes);
        options.quality = self.quality;
        options.preview = self.preview;
        options.transparent = self.transparent;
        options.save_last_frame = self.save_last_frame;
        options.gif = self.gif;
        options.parallel = self.parallel;
        options.max_workers = self.max_workers;
        options.use_manim_multiprocessing = self.use_manim_multiprocessing;
        options.progress = self.progress;
        options.media_dir = settings.media_dir.clone();
        Some(options)
    }
}

/// Live state of a render shown in the progress view.
pub struct RenderSession {
    events: Receiver<Status>,
    handle: Option<JoinHandle<Result<RenderSummary, String>>>,
    pub log: String,
    pub overall: f32,
    pub scene_progress: f32,
    pub status_line: String,
    pub summary: Option<RenderSummary>,
    pub error: Option<String>,
}

impl RenderSession {
    fn start(options: RenderOptions, executable: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || -> Result<RenderSummary, String> {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| format!("Unable to start the async runtime: {e}"))?;
            let orchestrator = Orchestrator::new(probe(&executable));
            Ok(runtime.block_on(orchestrator.render(options, tx)))
        });

        Self {
            events: rx,
            handle: Some(handle),
            log: String::new(),
            overall: 0.0,
            scene_progress: 0.0,
            status_line: "Preparing...".to_owned(),
            summary: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Apply whatever the render thread sent since the last frame.
    fn poll(&mut self) {
        // checked before draining so nothing sent at the very end is missed
        let finished = self.handle.as_ref().is_some_and(|h| h.is_finished());
        while let Ok(status) = self.events.try_recv() {
            self.apply(status);
        }

        if finished {
            if let Some(handle) = self.handle.take() {
                match handle.join() {
                    Ok(Ok(summary)) => {
                        self.log.push_str(&summary.report());
                        self.log.push('\n');
                        self.summary = Some(summary);
                    }
                    Ok(Err(e)) => self.error = Some(e),
                    Err(_) => self.error = Some("Render thread panicked".to_owned()),
                }
            }
        }
    }

    pub fn apply(&mut self, status: Status) {
        match status {
            Status::SceneStarted {
                scene,
                index,
                total,
            } => {
                self.scene_progress = 0.0;
                self.status_line = format!("[{index}/{total}] {scene}: starting");
            }
            Status::SceneProgress {
                scene,
                animation,
                percent,
                source,
            } => {
                self.scene_progress = f32::from(percent) / 100.0;
                self.status_line = match (source, animation) {
                    (ProgressSource::Simulated, _) => {
                        format!("[{scene}] rendering: {percent}% (simulated)")
                    }
                    (ProgressSource::Parsed, Some(n)) => {
                        format!("[{scene}] animation {n}: {percent}%")
                    }
                    (ProgressSource::Parsed, None) => format!("[{scene}] {percent}%"),
                };
            }
            Status::Log { message } => {
                self.log.push_str(&message);
                self.log.push('\n');
            }
            Status::SceneFinished(result) => {
                self.log.push_str(&result.output);
                self.log.push('\n');
            }
            Status::Overall {
                done,
                total,
                percent,
            } => {
                self.overall = f32::from(percent) / 100.0;
                self.status_line = format!("Overall: {done}/{total} ({percent}%)");
            }
            Status::FallBack { reason } => {
                self.log.push_str(&format!(
                    "Parallel render failed: {reason}\nFalling back to rendering one scene at a time...\n"
                ));
            }
        }
    }
}

enum View {
    Form,
    Confirm(RenderOptions),
    Rendering,
}

pub struct GuiApp {
    settings: AppSetting,
    form: FormState,
    view: View,
    session: Option<RenderSession>,
    warning: Option<String>,
}

impl GuiApp {
    pub fn new(settings: AppSetting) -> Self {
        let mut form = FormState::new(&settings);
        form.refresh_files(".");
        Self {
            settings,
            form,
            view: View::Form,
            session: None,
            warning: None,
        }
    }

    /// Open the window and block until it is closed.
    pub fn run(settings: AppSetting) -> anyhow::Result<()> {
        tracing::info!("Starting configuration form");
        let native_options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([700.0, 600.0])
                .with_min_inner_size([560.0, 480.0])
                .with_title("Manim Render Launcher"),
            ..Default::default()
        };

        eframe::run_native(
            "manim-launcher",
            native_options,
            Box::new(|_cc| Ok(Box::new(GuiApp::new(settings)))),
        )
        .map_err(|e| anyhow::anyhow!("Unable to open the window: {e}"))
    }

    fn request_render(&mut self) {
        match self.form.to_options(&self.settings) {
            Some(options) => {
                self.warning = None;
                self.view = View::Confirm(options);
            }
            None => self.warning = Some("Select at least one scene to render".to_owned()),
        }
    }

    fn start_render(&mut self, options: RenderOptions) {
        self.settings.quality = options.quality;
        self.settings.workers = options.max_workers;
        self.settings.progress = options.progress;
        if let Err(e) = self.settings.save() {
            tracing::warn!("Unable to save settings: {e}");
        }

        tracing::info!("Rendering from form:\n{}", options.describe());
        self.session = Some(RenderSession::start(
            options,
            self.settings.manim_executable.clone(),
        ));
        self.view = View::Rendering;
    }

    fn form_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Manim render configuration");
        ui.add_space(8.0);

        ui.columns(2, |columns| {
            self.file_ui(&mut columns[0]);
            self.scene_ui(&mut columns[0]);
            self.quality_ui(&mut columns[1]);
            self.options_ui(&mut columns[1]);
            self.workers_ui(&mut columns[1]);
        });

        if let Some(warning) = &self.warning {
            ui.add_space(8.0);
            ui.colored_label(FAILURE_COLOR, warning);
        }
    }

    fn file_ui(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.strong("Script");
            let current = self
                .form
                .file
                .as_ref()
                .map(|f| f.display().to_string())
                .unwrap_or_else(|| "No .py file found".to_owned());

            let mut chosen = self.form.file.clone();
            egui::ComboBox::from_id_salt("script_file")
                .selected_text(current)
                .width(ui.available_width())
                .show_ui(ui, |ui| {
                    for file in &self.form.files {
                        ui.selectable_value(&mut chosen, Some(file.clone()), file.display().to_string());
                    }
                });
            if chosen != self.form.file {
                self.form.set_file(chosen);
            }

            ui.horizontal(|ui| {
                if ui.button("Refresh file list").clicked() {
                    self.form.refresh_files(".");
                }
                if ui.button("Browse...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Python", &["py"])
                        .set_directory(".")
                        .pick_file()
                    {
                        if !self.form.files.contains(&path) {
                            self.form.files.push(path.clone());
                        }
                        self.form.set_file(Some(path));
                    }
                }
            });
        });
    }

    fn scene_ui(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            egui::CollapsingHeader::new("Scenes")
                .default_open(true)
                .show(ui, |ui| {
                    if self.form.scenes.is_empty() {
                        ui.weak("No scenes found in this file");
                        return;
                    }
                    egui::ScrollArea::vertical()
                        .id_salt("scene_list")
                        .max_height(220.0)
                        .show(ui, |ui| {
                            for (scene, selected) in
                                self.form.scenes.iter().zip(self.form.selected.iter_mut())
                            {
                                ui.checkbox(selected, scene);
                            }
                        });
                    ui.horizontal(|ui| {
                        if ui.button("Select all").clicked() {
                            self.form.select_all();
                        }
                        if ui.button("Deselect all").clicked() {
                            self.form.deselect_all();
                        }
                    });
                });
        });
    }

    fn quality_ui(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            egui::CollapsingHeader::new("Quality")
                .default_open(true)
                .show(ui, |ui| {
                    for quality in Quality::ALL {
                        ui.radio_value(&mut self.form.quality, quality, quality.label());
                    }
                });
        });
    }

    fn options_ui(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.strong("Options");
            ui.checkbox(&mut self.form.preview, "Preview after render");
            ui.checkbox(&mut self.form.transparent, "Transparent background");
            ui.checkbox(&mut self.form.save_last_frame, "Save last frame only");
            ui.checkbox(&mut self.form.gif, "Export GIF");
            ui.checkbox(
                &mut self.form.use_manim_multiprocessing,
                "Renderer multiprocessing",
            );
            let mut simulated = self.form.progress == ProgressMode::Simulated;
            if ui
                .checkbox(&mut simulated, "Simulated progress (cosmetic ticker)")
                .changed()
            {
                self.form.progress = if simulated {
                    ProgressMode::Simulated
                } else {
                    ProgressMode::Parsed
                };
            }
        });
    }

    fn workers_ui(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            egui::CollapsingHeader::new("Parallel rendering")
                .default_open(true)
                .show(ui, |ui| {
                    ui.checkbox(&mut self.form.parallel, "Render several scenes at once");
                    let enabled = self.form.parallel;
                    ui.horizontal(|ui| {
                        ui.label("Workers:");
                        ui.add_enabled(
                            enabled,
                            egui::DragValue::new(&mut self.form.max_workers).range(1..=MAX_WORKERS),
                        );
                        let shortcut = FormState::cpu_shortcut();
                        if ui
                            .add_enabled(
                                enabled,
                                egui::Button::new(format!("Logical processors x2 ({shortcut})")),
                            )
                            .clicked()
                        {
                            self.form.max_workers = shortcut;
                        }
                    });
                    let logical = default_workers();
                    ui.weak(format!(
                        "Tip: {}-{} workers usually works well on this machine.",
                        (logical / 2).max(1),
                        logical
                    ));
                });
        });
    }

    fn confirm_ui(&mut self, ui: &mut egui::Ui, options: &RenderOptions) -> Option<bool> {
        let mut answer = None;
        ui.heading("Start this render?");
        ui.add_space(8.0);
        ui.label(egui::RichText::new(options.describe()).monospace());
        ui.add_space(12.0);
        ui.horizontal(|ui| {
            if ui.button("Render").clicked() {
                answer = Some(true);
            }
            if ui.button("Back").clicked() {
                answer = Some(false);
            }
        });
        answer
    }

    fn rendering_ui(&mut self, ui: &mut egui::Ui) {
        let Some(session) = self.session.as_mut() else {
            self.view = View::Form;
            return;
        };

        ui.heading("Render progress");
        ui.label("Overall:");
        ui.add(egui::ProgressBar::new(session.overall).show_percentage());
        ui.label("Current scene:");
        ui.add(egui::ProgressBar::new(session.scene_progress).show_percentage());
        ui.label(&session.status_line);
        ui.separator();

        let mut back = false;
        if !session.is_running() {
            if let Some(summary) = &session.summary {
                if summary.status_code() == 0 {
                    ui.colored_label(SUCCESS_COLOR, egui::RichText::new("Render succeeded!").heading());
                    ui.label(format!(
                        "Rendered {}/{} scenes",
                        summary.successful, summary.total
                    ));
                } else {
                    ui.colored_label(
                        FAILURE_COLOR,
                        egui::RichText::new("Errors occurred during render").heading(),
                    );
                    ui.label(format!(
                        "Only {}/{} scenes rendered",
                        summary.successful, summary.total
                    ));
                }
            }
            if let Some(error) = &session.error {
                ui.colored_label(FAILURE_COLOR, error);
            }
            back = ui.button("Back to form").clicked();
            ui.separator();
        }

        egui::ScrollArea::vertical()
            .id_salt("render_log")
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                ui.label(egui::RichText::new(&session.log).monospace());
            });

        if back {
            self.session = None;
            self.view = View::Form;
        }
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(session) = self.session.as_mut() {
            session.poll();
            if session.is_running() {
                ctx.request_repaint_after(REPAINT_INTERVAL);
            }
        }

        let mut exit = false;
        let mut render = false;
        if matches!(self.view, View::Form) {
            egui::TopBottomPanel::bottom("actions").show(ctx, |ui| {
                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    render = ui.button("Start render").clicked();
                    exit = ui.button("Exit").clicked();
                });
                ui.add_space(6.0);
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            match std::mem::replace(&mut self.view, View::Form) {
                View::Form => self.form_ui(ui),
                View::Confirm(options) => match self.confirm_ui(ui, &options) {
                    Some(true) => self.start_render(options),
                    Some(false) => self.view = View::Form,
                    None => self.view = View::Confirm(options),
                },
                View::Rendering => {
                    self.view = View::Rendering;
                    self.rendering_ui(ui);
                }
            }
        });

        if render {
            self.request_render();
        }
        if exit {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manim::RenderResult;
    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("manim-gui-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const SCRIPT: &str = "from manim import Scene\n\nclass One(Scene):\n    pass\n\nclass Two(Scene):\n    pass\n";

    #[test]
    fn refresh_picks_first_script_and_scans_it() {
        let dir = scratch("refresh");
        fs::write(dir.join("a.py"), SCRIPT).unwrap();
        fs::write(dir.join("b.py"), "").unwrap();

        let mut form = FormState::new(&AppSetting::default());
        form.refresh_files(&dir);
        assert_eq!(form.files.len(), 2);
        assert_eq!(form.file, Some(dir.join("a.py")));
        assert_eq!(form.scenes, vec!["One", "Two"]);
        assert_eq!(form.selected, vec![false, false]);

        // a second refresh keeps the chosen file
        form.set_file(Some(dir.join("b.py")));
        form.refresh_files(&dir);
        assert_eq!(form.file, Some(dir.join("b.py")));
        assert!(form.scenes.is_empty());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn nothing_selected_means_no_render() {
        let dir = scratch("select");
        let script = dir.join("scene.py");
        fs::write(&script, SCRIPT).unwrap();

        let settings = AppSetting::default();
        let mut form = FormState::new(&settings);
        form.set_file(Some(script.clone()));
        assert!(form.to_options(&settings).is_none());

        form.selected[1] = true;
        let options = form.to_options(&settings).unwrap();
        assert_eq!(options.scenes, vec!["Two"]);
        assert_eq!(options.file, script);

        form.select_all();
        assert_eq!(form.selected_scenes(), vec!["One", "Two"]);
        form.deselect_all();
        assert!(form.selected_scenes().is_empty());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn form_carries_settings() {
        let settings = AppSetting {
            quality: Quality::Medium,
            workers: 100,
            progress: ProgressMode::Simulated,
            ..Default::default()
        };
        let form = FormState::new(&settings);
        assert_eq!(form.quality, Quality::Medium);
        assert_eq!(form.max_workers, MAX_WORKERS);
        assert_eq!(form.progress, ProgressMode::Simulated);
        assert!(FormState::cpu_shortcut() <= MAX_WORKERS);
    }

    #[test]
    fn session_tracks_progress() {
        let (tx, rx) = mpsc::channel();
        let mut session = RenderSession {
            events: rx,
            handle: None,
            log: String::new(),
            overall: 0.0,
            scene_progress: 0.0,
            status_line: String::new(),
            summary: None,
            error: None,
        };

        tx.send(Status::SceneProgress {
            scene: "One".into(),
            animation: Some(2),
            percent: 50,
            source: ProgressSource::Parsed,
        })
        .unwrap();
        tx.send(Status::SceneFinished(RenderResult::failed("One", "boom")))
            .unwrap();
        tx.send(Status::Overall {
            done: 1,
            total: 2,
            percent: 50,
        })
        .unwrap();
        session.poll();

        assert_eq!(session.scene_progress, 0.5);
        assert_eq!(session.overall, 0.5);
        assert!(session.log.contains("boom"));
        assert_eq!(session.status_line, "Overall: 1/2 (50%)");
        assert!(!session.is_running());
    }
}
