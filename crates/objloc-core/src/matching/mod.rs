use serde::{Deserialize, Serialize};

use crate::features::{BinaryDescriptor, FeatureSet};
use crate::geometry::Correspondence;

pub mod filter;
pub use filter::{DistanceRatioFilter, FilterConfig};

/// Nearest-reference correspondence for one frame descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Index into the reference profile's keypoints/descriptors.
    pub reference_idx: usize,
    /// Index into the frame's keypoints/descriptors.
    pub frame_idx: usize,
    /// Hamming distance; lower is more similar.
    pub distance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Nearest reference descriptor for every frame descriptor.
    #[default]
    BruteForceHamming,
    /// As above, keeping only pairs that are also each other's nearest
    /// neighbour when searching from the reference side.
    BruteForceHammingCrossCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub kind: MatcherKind,
}

/// Exhaustive Hamming matcher. The reference set is small, so every pair is
/// compared.
#[derive(Debug, Clone, Copy, Default)]
pub struct HammingMatcher {
    kind: MatcherKind,
}

impl HammingMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { kind: config.kind }
    }

    /// Returns at most one match per frame descriptor, in frame-index order.
    /// Either side being empty yields an empty set.
    pub fn match_descriptors(
        &self,
        reference: &[BinaryDescriptor],
        frame: &[BinaryDescriptor],
    ) -> Vec<Match> {
        if reference.is_empty() || frame.is_empty() {
            return Vec::new();
        }

        let forward: Vec<Match> = frame
            .iter()
            .enumerate()
            .filter_map(|(frame_idx, query)| {
                nearest(query, reference).map(|(reference_idx, distance)| Match {
                    reference_idx,
                    frame_idx,
                    distance,
                })
            })
            .collect();

        match self.kind {
            MatcherKind::BruteForceHamming => forward,
            MatcherKind::BruteForceHammingCrossCheck => forward
                .into_iter()
                .filter(|m| {
                    nearest(&reference[m.reference_idx], frame)
                        .is_some_and(|(back_idx, _)| back_idx == m.frame_idx)
                })
                .collect(),
        }
    }
}

/// Pairs each match's reference and frame keypoint positions.
pub fn correspondences(
    reference: &FeatureSet,
    frame: &FeatureSet,
    matches: &[Match],
) -> Vec<Correspondence> {
    matches
        .iter()
        .map(|m| Correspondence::new(reference.point(m.reference_idx), frame.point(m.frame_idx)))
        .collect()
}

/// Index and distance of the closest candidate; ties keep the lowest index.
fn nearest(query: &BinaryDescriptor, candidates: &[BinaryDescriptor]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let distance = query.hamming(candidate);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((idx, distance));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DESCRIPTOR_BYTES;

    fn desc(fill: &[(usize, u8)]) -> BinaryDescriptor {
        let mut bytes = [0u8; DESCRIPTOR_BYTES];
        for &(i, v) in fill {
            bytes[i] = v;
        }
        BinaryDescriptor(bytes)
    }

    #[test]
    fn empty_frame_yields_no_matches() {
        let matcher = HammingMatcher::default();
        assert!(matcher.match_descriptors(&[desc(&[])], &[]).is_empty());
        assert!(matcher.match_descriptors(&[], &[desc(&[])]).is_empty());
    }

    #[test]
    fn finds_nearest_reference_per_frame_descriptor() {
        let reference = [desc(&[(0, 0xFF)]), desc(&[(1, 0xFF)]), desc(&[])];
        let frame = [desc(&[(1, 0xFE)]), desc(&[(0, 0x01)])];
        let matches = HammingMatcher::default().match_descriptors(&reference, &frame);
        assert_eq!(
            matches,
            vec![
                Match {
                    reference_idx: 1,
                    frame_idx: 0,
                    distance: 1
                },
                Match {
                    reference_idx: 2,
                    frame_idx: 1,
                    distance: 1
                },
            ]
        );
    }

    #[test]
    fn ties_resolve_to_lowest_reference_index() {
        let reference = [desc(&[(0, 0x0F)]), desc(&[(0, 0xF0)])];
        let frame = [desc(&[])];
        let matches = HammingMatcher::default().match_descriptors(&reference, &frame);
        assert_eq!(matches[0].reference_idx, 0);
        assert_eq!(matches[0].distance, 4);
    }

    #[test]
    fn cross_check_drops_one_sided_matches() {
        let reference = [desc(&[])];
        let frame = [desc(&[(0, 0x01)]), desc(&[(0, 0x03)])];
        let config = MatcherConfig {
            kind: MatcherKind::BruteForceHammingCrossCheck,
        };
        let matches = HammingMatcher::new(config).match_descriptors(&reference, &frame);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].frame_idx, 0);
    }
}
