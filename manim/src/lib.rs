// wrapper around the renderer executable
pub mod manim;

// types passed between front ends and the renderer
pub mod models;

// runs a batch of scenes, one at a time or through the worker pool
pub mod orchestrator;

// progress read from the renderer's stderr
pub mod progress;

// finds scene classes in a script
pub mod scan;

pub use manim::{Manim, ManimError};
pub use models::{
    args::Args,
    options::{ProgressMode, RenderOptions},
    quality::Quality,
    render_result::{RenderResult, RenderSummary},
    status::{ProgressSource, Status},
};
pub use orchestrator::{Orchestrator, SceneJob, SceneRunner};
