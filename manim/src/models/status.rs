use crate::models::render_result::RenderResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressSource {
    /// Read from the renderer's own progress bars.
    Parsed,
    /// Cosmetic ticker, unrelated to actual progress.
    Simulated,
}

/// Events streamed to whoever drives the render (terminal or form).
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    SceneStarted {
        scene: String,
        index: usize,
        total: usize,
    },
    SceneProgress {
        scene: String,
        animation: Option<u32>,
        percent: u8,
        source: ProgressSource,
    },
    Log {
        message: String,
    },
    SceneFinished(RenderResult),
    Overall {
        done: usize,
        total: usize,
        percent: u8,
    },
    FallBack {
        reason: String,
    },
}
