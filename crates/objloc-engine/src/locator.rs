use std::time::{Duration, Instant};

use image::GrayImage;
use log::{debug, trace, warn};
use objloc_core::geometry::{HomographyError, HomographyEstimate};
use objloc_core::localize::{self, DetectionResult, Quadrilateral};
use objloc_core::matching::correspondences;
use objloc_core::{
    DistanceRatioFilter, FeatureExtractor, HammingMatcher, HomographyEstimator,
};
use objloc_providers::{DecodedFrame, FrameSample};
use serde::{Deserialize, Serialize};

use crate::config::LocatorConfig;
use crate::errors::CalibrationLoadError;
use crate::frame_buffer::FrameBuffer;
use crate::reference::ReferenceProfile;

/// Why a cycle ended without a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotLocatedReason {
    FrameDecode { message: String },
    InsufficientCorrespondences { found: usize },
    DegenerateGeometry { detail: String },
    /// A boundary corner projected to infinity.
    UnboundedProjection,
}

/// Result of one detection cycle plus per-stage counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Sequence number of the processed frame, if it came from the buffer.
    pub sequence: Option<u64>,
    pub result: DetectionResult,
    pub frame_keypoints: usize,
    pub raw_matches: usize,
    pub filtered_matches: usize,
    pub inliers: usize,
    pub reason: Option<NotLocatedReason>,
    pub elapsed_ms: f64,
}

impl CycleReport {
    fn not_located(sequence: Option<u64>, reason: NotLocatedReason, elapsed: Duration) -> Self {
        Self {
            sequence,
            result: DetectionResult::NotLocated,
            frame_keypoints: 0,
            raw_matches: 0,
            filtered_matches: 0,
            inliers: 0,
            reason: Some(reason),
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
        }
    }
}

/// Receives every decoded frame together with its cycle report, for
/// rendering or publishing.
pub trait DetectionSink {
    fn on_detection(&mut self, frame: &DecodedFrame, report: &CycleReport);
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DetectionSink for NullSink {
    fn on_detection(&mut self, _frame: &DecodedFrame, _report: &CycleReport) {}
}

/// Runs the detection pipeline against a fixed reference profile.
///
/// Owns the frame buffer; ingestion gets a handle via
/// [`ObjectLocator::frame_buffer`]. Cycles run one at a time on the caller's
/// thread.
pub struct ObjectLocator {
    reference: ReferenceProfile,
    extractor: FeatureExtractor,
    matcher: HammingMatcher,
    filter: DistanceRatioFilter,
    estimator: HomographyEstimator,
    buffer: FrameBuffer<FrameSample>,
    cycles: u64,
}

impl ObjectLocator {
    /// Loads the calibration image named in `config` and builds the locator.
    pub fn from_config(config: &LocatorConfig) -> Result<Self, CalibrationLoadError> {
        let path = config
            .calibration_image
            .as_deref()
            .ok_or(CalibrationLoadError::Missing)?;
        let extractor = FeatureExtractor::new(config.extractor);
        let reference = ReferenceProfile::from_path(path, &extractor)?;
        Ok(Self::with_reference(config, reference))
    }

    pub fn with_reference(config: &LocatorConfig, reference: ReferenceProfile) -> Self {
        Self {
            reference,
            extractor: FeatureExtractor::new(config.extractor),
            matcher: HammingMatcher::new(config.matcher),
            filter: DistanceRatioFilter::new(config.filter),
            estimator: HomographyEstimator::new(config.ransac),
            buffer: FrameBuffer::new(),
            cycles: 0,
        }
    }

    pub fn reference(&self) -> &ReferenceProfile {
        &self.reference
    }

    /// Handle for the ingestion side.
    pub fn frame_buffer(&self) -> FrameBuffer<FrameSample> {
        self.buffer.clone()
    }

    pub fn submit_frame(&self, frame: FrameSample) {
        self.buffer.submit(frame);
    }

    /// Cycles that found a frame to process.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn on_cycle(&mut self) -> Option<CycleReport> {
        self.on_cycle_with(&mut NullSink)
    }

    /// Takes the buffered frame, if any, and localises the object in it.
    /// Returns `None` when no frame was waiting. A frame that fails to
    /// decode is skipped and reported as not located; the sink only sees
    /// decoded frames.
    pub fn on_cycle_with<S: DetectionSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Option<CycleReport> {
        let sample = self.buffer.take()?;
        self.cycles += 1;
        let start = Instant::now();

        let frame = match sample.decode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Skipping frame {}: {}", sample.sequence, err);
                return Some(CycleReport::not_located(
                    Some(sample.sequence),
                    NotLocatedReason::FrameDecode {
                        message: err.to_string(),
                    },
                    start.elapsed(),
                ));
            }
        };

        let mut report = self.run(&frame.gray, start);
        report.sequence = Some(frame.sequence);
        sink.on_detection(&frame, &report);
        Some(report)
    }

    /// Runs the pipeline on a single grayscale image, bypassing the buffer.
    pub fn locate(&self, image: &GrayImage) -> CycleReport {
        self.run(image, Instant::now())
    }

    fn run(&self, image: &GrayImage, start: Instant) -> CycleReport {
        let reference = self.reference.features();
        let frame = self.extractor.extract(image);
        let raw = self
            .matcher
            .match_descriptors(&reference.descriptors, &frame.descriptors);
        let kept = self.filter.filter(&raw);
        trace!(
            "Cycle: {} keypoints, {} matches, {} after filter",
            frame.len(),
            raw.len(),
            kept.len()
        );

        let corrs = correspondences(reference, &frame, &kept);
        let (result, inliers, reason) =
            outcome(self.estimator.estimate(&corrs), self.reference.boundary());

        match (&result, &reason) {
            (DetectionResult::Located { point, .. }, _) => {
                debug!("Located at ({:.1}, {:.1}) with {} inliers", point.x, point.y, inliers)
            }
            (_, Some(reason)) => debug!("Not located: {reason:?}"),
            _ => {}
        }

        CycleReport {
            sequence: None,
            result,
            frame_keypoints: frame.len(),
            raw_matches: raw.len(),
            filtered_matches: kept.len(),
            inliers,
            reason,
            elapsed_ms: start.elapsed().as_secs_f64() * 1e3,
        }
    }
}

/// Turns an estimation result into the cycle's detection, inlier count and
/// not-located reason.
fn outcome(
    estimate: Result<HomographyEstimate, HomographyError>,
    boundary: &Quadrilateral,
) -> (DetectionResult, usize, Option<NotLocatedReason>) {
    match estimate {
        Ok(HomographyEstimate {
            homography,
            inliers,
            ..
        }) => {
            let result = localize::locate(&homography, boundary);
            let reason = (!result.is_located()).then_some(NotLocatedReason::UnboundedProjection);
            (result, inliers.len(), reason)
        }
        Err(HomographyError::InsufficientCorrespondences { found, .. }) => (
            DetectionResult::NotLocated,
            0,
            Some(NotLocatedReason::InsufficientCorrespondences { found }),
        ),
        Err(HomographyError::DegenerateGeometry(detail)) => (
            DetectionResult::NotLocated,
            0,
            Some(NotLocatedReason::DegenerateGeometry {
                detail: detail.to_string(),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;
    use objloc_core::Homography;
    use objloc_core::localize::image_boundary;

    fn estimate(matrix: Matrix3<f64>) -> Result<HomographyEstimate, HomographyError> {
        Ok(HomographyEstimate {
            homography: Homography::from_matrix(matrix).unwrap(),
            inliers: (0..6).collect(),
            mean_error_px: 0.5,
        })
    }

    #[test]
    fn translation_is_located_with_its_inliers() {
        let matrix = Matrix3::new(1.0, 0.0, 10.0, 0.0, 1.0, 20.0, 0.0, 0.0, 1.0);
        let (result, inliers, reason) = outcome(estimate(matrix), &image_boundary(40, 30));
        assert!(result.is_located());
        assert_eq!(inliers, 6);
        assert!(reason.is_none());
    }

    #[test]
    fn corner_on_the_vanishing_line_is_unbounded() {
        // w = 1 - x/40 vanishes at the reference's right edge.
        let matrix = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0 / 40.0, 0.0, 1.0);
        let (result, inliers, reason) = outcome(estimate(matrix), &image_boundary(40, 30));
        assert_eq!(result, DetectionResult::NotLocated);
        assert_eq!(inliers, 6);
        assert_eq!(reason, Some(NotLocatedReason::UnboundedProjection));
    }

    #[test]
    fn degenerate_geometry_is_not_located() {
        let (result, inliers, reason) = outcome(
            Err(HomographyError::DegenerateGeometry("singular transform")),
            &image_boundary(40, 30),
        );
        assert_eq!(result, DetectionResult::NotLocated);
        assert_eq!(inliers, 0);
        assert_eq!(
            reason,
            Some(NotLocatedReason::DegenerateGeometry {
                detail: "singular transform".to_string()
            })
        );
    }
}
