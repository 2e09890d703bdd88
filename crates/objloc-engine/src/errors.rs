use std::path::PathBuf;

use thiserror::Error;

/// The reference image could not be turned into a profile. Fatal at startup.
#[derive(Debug, Error)]
pub enum CalibrationLoadError {
    #[error("No calibration image configured")]
    Missing,

    #[error("Failed to read calibration image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode calibration image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Calibration image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
