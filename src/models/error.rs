use std::io;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unable to locate the user's config directory")]
    NoConfigDir,
}
