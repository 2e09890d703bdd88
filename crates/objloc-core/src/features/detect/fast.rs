use log::trace;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use super::utils::distribute;
use super::{CornerDetector, FeatureSeed, GridConfig};
use crate::img::PyramidLevel;

const CIRCLE_RADIUS: usize = 3;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE_OFFSETS: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastDetectorType {
    Type5_8,
    Type7_12,
    Type9_16,
}

impl FastDetectorType {
    #[inline]
    fn contiguous_arc_length(self) -> usize {
        match self {
            Self::Type5_8 => 5,
            Self::Type7_12 => 7,
            Self::Type9_16 => 9,
        }
    }
}

/// FAST segment-test corner detector with 3x3 non-max suppression.
#[derive(Debug, Clone)]
pub struct FastDetector {
    grid: GridConfig,
    threshold: f32,
    arc_length: usize,
}

impl FastDetector {
    pub fn new(grid: GridConfig, threshold: f32, detector_type: FastDetectorType) -> Self {
        let threshold = threshold.max(0.0);
        let arc_length = detector_type.contiguous_arc_length();
        trace!("FAST detector: threshold {threshold:.1}, arc length {arc_length}");
        Self {
            grid,
            threshold,
            arc_length,
        }
    }
}

impl CornerDetector for FastDetector {
    fn detect(&self, level: &PyramidLevel) -> Vec<FeatureSeed> {
        let width = level.width();
        let height = level.height();
        let border = self.grid.edge_margin.max(CIRCLE_RADIUS);
        if width <= border * 2 || height <= border * 2 {
            return Vec::new();
        }

        let (x_lo, x_hi) = (border, width - border);
        let (y_lo, y_hi) = (border, height - border);

        let mut score_map = vec![0.0f32; width * height];
        let mut candidates = Vec::new();
        for y in y_lo..y_hi {
            for x in x_lo..x_hi {
                if let Some(score) = corner_score(level, x, y, self.threshold, self.arc_length) {
                    score_map[y * width + x] = score;
                    candidates.push((x, y, score));
                }
            }
        }

        trace!(
            "FAST found {} raw corners on octave {} above threshold {:.1}",
            candidates.len(),
            level.octave,
            self.threshold
        );
        if candidates.is_empty() {
            return Vec::new();
        }

        let seeds: Vec<FeatureSeed> = candidates
            .into_iter()
            .filter(|&(x, y, score)| is_local_max(&score_map, width, height, x, y, score))
            .map(|(x, y, score)| FeatureSeed {
                octave: level.octave,
                position: Vector2::new(x as f32, y as f32),
                score,
            })
            .collect();

        let cell = self.grid.cell_size.max(4);
        let cells_x = (x_hi - x_lo).div_ceil(cell);
        let cells_y = (y_hi - y_lo).div_ceil(cell);
        let seeds = distribute(seeds, &self.grid, x_lo, y_lo, cells_x, cells_y);

        trace!(
            "FAST kept {} of the corners in {}x{} (octave {})",
            seeds.len(),
            width,
            height,
            level.octave
        );
        seeds
    }
}

/// Returns the corner score (sum of absolute differences along the best
/// qualifying arc) when at least `arc_length` contiguous circle pixels are all
/// brighter or all darker than the centre by `threshold`.
fn corner_score(
    level: &PyramidLevel,
    x: usize,
    y: usize,
    threshold: f32,
    arc_length: usize,
) -> Option<f32> {
    let center = level.intensity(x, y);
    let high = center + threshold;
    let low = center - threshold;
    let sample = |(dx, dy): (isize, isize)| {
        level.intensity((x as isize + dx) as usize, (y as isize + dy) as usize)
    };

    // Compass test: a 9-arc must cover at least two of the four compass
    // points, a shorter arc at least one.
    let required = if arc_length >= 9 { 2 } else { 1 };
    let (mut brighter, mut darker) = (0, 0);
    for idx in [0usize, 4, 8, 12] {
        let v = sample(CIRCLE_OFFSETS[idx]);
        if v > high {
            brighter += 1;
        } else if v < low {
            darker += 1;
        }
    }
    if brighter < required && darker < required {
        return None;
    }

    let mut values = [0.0f32; 16];
    let mut classes = [0i8; 16];
    for (i, &offset) in CIRCLE_OFFSETS.iter().enumerate() {
        let v = sample(offset);
        values[i] = v;
        classes[i] = if v > high {
            1
        } else if v < low {
            -1
        } else {
            0
        };
    }

    let mut best: Option<f32> = None;
    for polarity in [1i8, -1] {
        let mut run = 0usize;
        let mut sum = 0.0f32;
        // Walk the circle twice so arcs wrapping past index 15 are seen whole.
        for i in 0..32 {
            let k = i % 16;
            if classes[k] == polarity {
                run += 1;
                sum += (values[k] - center).abs();
                if run >= arc_length && run <= 16 {
                    best = Some(best.map_or(sum, |b: f32| b.max(sum)));
                }
            } else {
                run = 0;
                sum = 0.0;
            }
        }
    }
    best
}

fn is_local_max(
    score_map: &[f32],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    score: f32,
) -> bool {
    let x_min = x.saturating_sub(1);
    let x_max = (x + 1).min(width - 1);
    let y_min = y.saturating_sub(1);
    let y_max = (y + 1).min(height - 1);
    for ny in y_min..=y_max {
        for nx in x_min..=x_max {
            if (nx, ny) == (x, y) {
                continue;
            }
            let neighbor = score_map[ny * width + nx];
            // Ties go to the neighbour earliest in raster order.
            if neighbor > score || (neighbor == score && (ny, nx) < (y, x)) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::build_pyramid;
    use image::{GrayImage, Luma};

    fn detector() -> FastDetector {
        let grid = GridConfig {
            edge_margin: 4,
            ..GridConfig::default()
        };
        FastDetector::new(grid, 20.0, FastDetectorType::Type9_16)
    }

    #[test]
    fn detects_square_corners() {
        let img = GrayImage::from_fn(48, 48, |x, y| {
            let inside = (16..32).contains(&x) && (16..32).contains(&y);
            Luma([if inside { 230 } else { 30 }])
        });
        let pyramid = build_pyramid(&img, 1, 1.0);
        let seeds = detector().detect(&pyramid.levels()[0]);

        assert!(!seeds.is_empty(), "expected FAST to find the square's corners");
        for (cx, cy) in [(16.0, 16.0), (31.0, 16.0), (31.0, 31.0), (16.0, 31.0)] {
            assert!(
                seeds
                    .iter()
                    .any(|s| (s.position.x - cx).abs() <= 2.0 && (s.position.y - cy).abs() <= 2.0),
                "no corner near ({cx}, {cy}): {seeds:?}"
            );
        }
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(40, 40, Luma([128]));
        let pyramid = build_pyramid(&img, 1, 1.0);
        assert!(detector().detect(&pyramid.levels()[0]).is_empty());
    }

    #[test]
    fn image_smaller_than_margin_is_skipped() {
        let img = GrayImage::from_pixel(6, 6, Luma([0]));
        let pyramid = build_pyramid(&img, 1, 1.0);
        assert!(detector().detect(&pyramid.levels()[0]).is_empty());
    }
}
