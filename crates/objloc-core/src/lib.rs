//! Planar object localisation primitives: feature extraction, descriptor
//! matching, robust homography estimation and boundary projection.

pub mod features;
pub mod geometry;
pub mod img;
pub mod localize;
pub mod matching;

pub use features::{ExtractorConfig, FeatureExtractor, FeatureSet, Keypoint};
pub use geometry::{Homography, HomographyError, HomographyEstimator, RansacConfig};
pub use localize::{DetectionResult, Quadrilateral};
pub use matching::{DistanceRatioFilter, FilterConfig, HammingMatcher, Match, MatcherConfig};

#[cfg(test)]
#[path = "../../../testdata/poster.rs"]
mod poster;
