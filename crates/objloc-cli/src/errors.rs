use std::path::PathBuf;

use objloc_engine::{CalibrationLoadError, ConfigError};
use thiserror::Error;

/// Errors that abort the replay run.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationLoadError),

    #[error("No image frames found in {0}")]
    NoFrames(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
