use std::path::Path;

use image::GrayImage;
use log::{info, warn};
use objloc_core::localize::{Quadrilateral, image_boundary};
use objloc_core::{FeatureExtractor, FeatureSet};

use crate::errors::CalibrationLoadError;

/// Features and boundary of the calibration image, computed once at startup
/// and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ReferenceProfile {
    features: FeatureSet,
    boundary: Quadrilateral,
    width: u32,
    height: u32,
}

impl ReferenceProfile {
    pub fn from_path(
        path: &Path,
        extractor: &FeatureExtractor,
    ) -> Result<Self, CalibrationLoadError> {
        let bytes = std::fs::read(path).map_err(|source| CalibrationLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loading calibration image {}", path.display());
        Self::from_bytes(&bytes, extractor)
    }

    /// Builds a profile from encoded image bytes (PNG, JPEG, ...).
    pub fn from_bytes(
        bytes: &[u8],
        extractor: &FeatureExtractor,
    ) -> Result<Self, CalibrationLoadError> {
        let gray = image::load_from_memory(bytes)?.to_luma8();
        Self::from_image(&gray, extractor)
    }

    pub fn from_image(
        image: &GrayImage,
        extractor: &FeatureExtractor,
    ) -> Result<Self, CalibrationLoadError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CalibrationLoadError::Empty { width, height });
        }

        let features = extractor.extract(image);
        if features.is_empty() {
            warn!(
                "Calibration image {width}x{height} has no keypoints; the object will never be located"
            );
        } else {
            info!(
                "Reference profile: {} keypoints on {width}x{height} image",
                features.len()
            );
        }

        Ok(Self {
            features,
            boundary: image_boundary(width, height),
            width,
            height,
        })
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Image corners clockwise from the top-left, in reference pixels.
    pub fn boundary(&self) -> &Quadrilateral {
        &self.boundary
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
