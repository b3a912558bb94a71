use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config parse error: {0}")]
    Config(#[from] json5::Error),
    #[error("Invalid bounding box ({x1}, {y1}, {x2}, {y2}): {reason}")]
    InvalidBox {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        reason: &'static str,
    },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Frame {frame}: {message}")]
    InvalidFrame { frame: usize, message: String },
}
