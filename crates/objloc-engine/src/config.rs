use std::path::{Path, PathBuf};

use log::debug;
use objloc_core::features::ExtractorConfig;
use objloc_core::geometry::homography::MIN_CORRESPONDENCES;
use objloc_core::{FilterConfig, MatcherConfig, RansacConfig};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::scheduler::MIN_RATE_HZ;

fn default_rate_hz() -> f64 {
    30.0
}

/// Every tunable of the detection loop, loadable from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Reference image of the planar object.
    #[serde(default)]
    pub calibration_image: Option<PathBuf>,
    /// Detection cycles per second.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub ransac: RansacConfig,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            calibration_image: None,
            rate_hz: default_rate_hz(),
            extractor: ExtractorConfig::default(),
            matcher: MatcherConfig::default(),
            filter: FilterConfig::default(),
            ransac: RansacConfig::default(),
        }
    }
}

impl LocatorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML file. Relative `calibration_image` paths
    /// are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&contents)?;
        if let (Some(image), Some(dir)) = (config.calibration_image.as_mut(), path.parent()) {
            if image.is_relative() {
                *image = dir.join(&*image);
            }
        }
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be positive, got {value}"
                )))
            }
        }

        if !self.rate_hz.is_finite() || self.rate_hz < MIN_RATE_HZ {
            return Err(ConfigError::Invalid(format!(
                "rate_hz must be at least {MIN_RATE_HZ}, got {}",
                self.rate_hz
            )));
        }
        positive("filter.multiplier", self.filter.multiplier as f64)?;
        positive("ransac.inlier_tolerance_px", self.ransac.inlier_tolerance_px)?;

        if !self.filter.min_distance_floor.is_finite() || self.filter.min_distance_floor < 0.0 {
            return Err(ConfigError::Invalid(
                "filter.min_distance_floor must be non-negative".to_string(),
            ));
        }
        if self.ransac.iterations == 0 {
            return Err(ConfigError::Invalid(
                "ransac.iterations must be at least 1".to_string(),
            ));
        }
        if self.ransac.min_inliers < MIN_CORRESPONDENCES {
            return Err(ConfigError::Invalid(format!(
                "ransac.min_inliers must be at least {MIN_CORRESPONDENCES}, got {}",
                self.ransac.min_inliers
            )));
        }
        if !(0.0..1.0).contains(&self.ransac.confidence) {
            return Err(ConfigError::Invalid(format!(
                "ransac.confidence must be in [0, 1), got {}",
                self.ransac.confidence
            )));
        }
        if self.extractor.octaves == 0 {
            return Err(ConfigError::Invalid(
                "extractor.octaves must be at least 1".to_string(),
            ));
        }
        if self.extractor.grid.cell_size == 0 || self.extractor.grid.max_features == 0 {
            return Err(ConfigError::Invalid(
                "extractor.cell_size and extractor.max_features must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
