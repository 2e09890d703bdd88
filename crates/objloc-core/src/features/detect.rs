use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::img::PyramidLevel;

pub mod fast;
pub use fast::{FastDetector, FastDetectorType};

pub mod shi_tomasi;
pub use shi_tomasi::ShiTomasiDetector;

pub mod utils;

/// Spatial distribution limits shared by every detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub cell_size: usize,
    pub per_cell_cap: usize,
    pub max_features: usize,
    pub nms_radius_px: f32,
    /// Corners closer than this to the level border are discarded so that
    /// descriptor patches stay inside the image.
    pub edge_margin: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: 32,
            per_cell_cap: 64,
            max_features: 500,
            nms_radius_px: 3.0,
            edge_margin: 20,
        }
    }
}

/// A corner found on a single pyramid level, in that level's pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSeed {
    pub octave: usize,
    pub position: Vector2<f32>,
    pub score: f32,
}

pub trait CornerDetector {
    fn detect(&self, level: &PyramidLevel) -> Vec<FeatureSeed>;
}
