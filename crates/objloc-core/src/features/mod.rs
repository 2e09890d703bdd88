//! Keypoint detection and binary description.
//!
//! [`FeatureExtractor`] runs a detector over every level of a Gaussian pyramid
//! and describes each corner with a 256-bit BRIEF-style descriptor. The
//! detector and descriptor are picked from closed enumerations when the
//! extractor is built, so the per-frame path never dispatches by name.

use std::cmp::Ordering;

use image::GrayImage;
use log::trace;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::img::build_pyramid;

pub mod descriptor;
pub mod detect;

pub use descriptor::{BinaryDescriptor, BriefExtractor, DESCRIPTOR_BYTES, DescriptorExtractor};
pub use detect::{
    CornerDetector, FastDetector, FastDetectorType, FeatureSeed, GridConfig, ShiTomasiDetector,
};

/// A detected feature in level-0 pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub position: Vector2<f32>,
    pub octave: usize,
    /// Size of one detection-level pixel in level-0 pixels.
    pub scale: f32,
    /// Patch orientation in radians.
    pub angle: f32,
    pub response: f32,
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<BinaryDescriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn point(&self, index: usize) -> Vector2<f64> {
        self.keypoints[index].position.cast::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Fast,
    ShiTomasi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Orb,
    UprightBrief,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub detector: DetectorKind,
    pub descriptor: DescriptorKind,
    pub octaves: usize,
    pub blur_sigma: f32,
    pub fast_threshold: f32,
    pub fast_type: FastDetectorType,
    pub shi_tomasi_threshold: f32,
    pub patch_radius: usize,
    #[serde(flatten)]
    pub grid: GridConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Fast,
            descriptor: DescriptorKind::Orb,
            octaves: 3,
            blur_sigma: 1.0,
            fast_threshold: 20.0,
            fast_type: FastDetectorType::Type9_16,
            shi_tomasi_threshold: 10.0,
            patch_radius: descriptor::brief::DEFAULT_PATCH_RADIUS,
            grid: GridConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
enum Detector {
    Fast(FastDetector),
    ShiTomasi(ShiTomasiDetector),
}

impl CornerDetector for Detector {
    fn detect(&self, level: &crate::img::PyramidLevel) -> Vec<FeatureSeed> {
        match self {
            Detector::Fast(d) => d.detect(level),
            Detector::ShiTomasi(d) => d.detect(level),
        }
    }
}

/// Detector + descriptor pair resolved once from an [`ExtractorConfig`].
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
    detector: Detector,
    descriptor: BriefExtractor,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let detector = match config.detector {
            DetectorKind::Fast => Detector::Fast(FastDetector::new(
                config.grid,
                config.fast_threshold,
                config.fast_type,
            )),
            DetectorKind::ShiTomasi => Detector::ShiTomasi(ShiTomasiDetector::new(
                config.grid,
                config.shi_tomasi_threshold,
            )),
        };
        let descriptor = match config.descriptor {
            DescriptorKind::Orb => BriefExtractor::orb(),
            DescriptorKind::UprightBrief => BriefExtractor::upright(),
        }
        .with_patch_radius(config.patch_radius);

        Self {
            config,
            detector,
            descriptor,
        }
    }

    /// Detects and describes features. Deterministic for a given image and
    /// configuration; a textureless or tiny image yields an empty set.
    pub fn extract(&self, image: &GrayImage) -> FeatureSet {
        let pyramid = build_pyramid(image, self.config.octaves, self.config.blur_sigma);

        let mut features: Vec<(Keypoint, BinaryDescriptor)> = Vec::new();
        for level in pyramid.levels() {
            let to_base = 1.0 / level.scale;
            for seed in self.detector.detect(level) {
                let (angle, descriptor) = self.descriptor.describe(level, &seed);
                features.push((
                    Keypoint {
                        position: seed.position * to_base,
                        octave: level.octave,
                        scale: to_base,
                        angle,
                        response: seed.score,
                    },
                    descriptor,
                ));
            }
        }

        features.sort_by(|(a, _), (b, _)| {
            b.response
                .partial_cmp(&a.response)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.position.y.total_cmp(&b.position.y))
                .then_with(|| a.position.x.total_cmp(&b.position.x))
                .then_with(|| a.octave.cmp(&b.octave))
        });
        features.truncate(self.config.grid.max_features);

        trace!(
            "Extracted {} features from {}x{} image over {} levels",
            features.len(),
            image.width(),
            image.height(),
            pyramid.levels().len()
        );

        let (keypoints, descriptors) = features.into_iter().unzip();
        FeatureSet {
            keypoints,
            descriptors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Dark canvas with bright rectangles of varying size on a 40px lattice.
    fn blocks(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let (cx, cy) = (x / 40, y / 40);
            let (ox, oy) = (x % 40, y % 40);
            let rw = 8 + (cx * 5 + cy * 3) % 14;
            let rh = 6 + (cx * 3 + cy * 7) % 12;
            let inside = (10..10 + rw).contains(&ox) && (12..12 + rh).contains(&oy);
            Luma([if inside { 220 } else { 40 }])
        })
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(ExtractorConfig::default());
        let img = blocks(160, 120);
        let first = extractor.extract(&img);
        let second = extractor.extract(&img);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn blank_image_yields_empty_set() {
        let extractor = FeatureExtractor::new(ExtractorConfig::default());
        let set = extractor.extract(&GrayImage::from_pixel(120, 90, Luma([128])));
        assert!(set.is_empty());
        assert!(set.descriptors.is_empty());
    }

    #[test]
    fn zero_sized_image_yields_empty_set() {
        let extractor = FeatureExtractor::new(ExtractorConfig::default());
        assert!(extractor.extract(&GrayImage::new(0, 0)).is_empty());
    }

    #[test]
    fn upper_octaves_report_base_coordinates() {
        let config = ExtractorConfig {
            octaves: 2,
            ..ExtractorConfig::default()
        };
        let set = FeatureExtractor::new(config).extract(&blocks(240, 200));
        for kp in &set.keypoints {
            assert_eq!(kp.scale, 2f32.powi(kp.octave as i32));
            assert!(kp.position.x < 240.0 && kp.position.y < 200.0);
        }
    }

    #[test]
    fn shi_tomasi_with_upright_brief_runs() {
        let config = ExtractorConfig {
            detector: DetectorKind::ShiTomasi,
            descriptor: DescriptorKind::UprightBrief,
            ..ExtractorConfig::default()
        };
        let set = FeatureExtractor::new(config).extract(&blocks(160, 120));
        assert_eq!(set.keypoints.len(), set.descriptors.len());
        assert!(set.keypoints.iter().all(|k| k.angle == 0.0));
    }
}
