use log::trace;
use serde::{Deserialize, Serialize};

use super::Match;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Matches must be closer than `multiplier` times the best distance.
    pub multiplier: f32,
    /// Lower bound applied to the best distance before scaling. Without it an
    /// exact (distance 0) match would make the threshold 0 and reject
    /// everything, itself included.
    pub min_distance_floor: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            multiplier: 3.0,
            min_distance_floor: 1.0,
        }
    }
}

/// Keeps matches whose distance is below a multiple of the best distance in
/// the set. Coarse: the threshold adapts per frame to lighting and texture
/// but knows nothing about how distinctive a match is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceRatioFilter {
    config: FilterConfig,
}

impl DistanceRatioFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self, min_distance: u32) -> f32 {
        self.config.multiplier * (min_distance as f32).max(self.config.min_distance_floor)
    }

    pub fn filter(&self, matches: &[Match]) -> Vec<Match> {
        let Some(min_distance) = matches.iter().map(|m| m.distance).min() else {
            return Vec::new();
        };
        let threshold = self.threshold(min_distance);
        let kept: Vec<Match> = matches
            .iter()
            .copied()
            .filter(|m| (m.distance as f32) < threshold)
            .collect();
        trace!(
            "Match filter: min {} threshold {:.1} kept {}/{}",
            min_distance,
            threshold,
            kept.len(),
            matches.len()
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_distances(distances: &[u32]) -> Vec<Match> {
        distances
            .iter()
            .enumerate()
            .map(|(i, &distance)| Match {
                reference_idx: i,
                frame_idx: i,
                distance,
            })
            .collect()
    }

    #[test]
    fn empty_set_stays_empty() {
        assert!(DistanceRatioFilter::default().filter(&[]).is_empty());
    }

    #[test]
    fn equal_distances_are_all_kept() {
        let matches = with_distances(&[12, 12, 12, 12, 12]);
        assert_eq!(DistanceRatioFilter::default().filter(&matches), matches);
    }

    #[test]
    fn rejects_matches_at_or_beyond_threshold() {
        let matches = with_distances(&[10, 29, 30, 31, 55]);
        let kept = DistanceRatioFilter::default().filter(&matches);
        let distances: Vec<_> = kept.iter().map(|m| m.distance).collect();
        assert_eq!(distances, vec![10, 29]);
    }

    #[test]
    fn floor_keeps_exact_matches() {
        let matches = with_distances(&[0, 0, 2, 3, 40]);
        let kept = DistanceRatioFilter::default().filter(&matches);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn zero_floor_is_the_bare_rule() {
        let filter = DistanceRatioFilter::new(FilterConfig {
            multiplier: 3.0,
            min_distance_floor: 0.0,
        });
        assert!(filter.filter(&with_distances(&[0, 0, 5])).is_empty());
        assert_eq!(filter.filter(&with_distances(&[4, 11, 12])).len(), 2);
    }
}
