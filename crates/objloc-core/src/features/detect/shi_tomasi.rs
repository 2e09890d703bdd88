use log::trace;
use nalgebra::Vector2;
use rayon::prelude::*;

use super::utils::distribute;
use super::{CornerDetector, FeatureSeed, GridConfig};
use crate::img::PyramidLevel;

/// Good-features-to-track detector: keeps pixels whose structure tensor has a
/// large minimum eigenvalue and that are local maxima of that response.
#[derive(Debug, Clone)]
pub struct ShiTomasiDetector {
    grid: GridConfig,
    threshold: f32,
}

impl ShiTomasiDetector {
    pub fn new(grid: GridConfig, threshold: f32) -> Self {
        Self {
            grid,
            threshold: threshold.max(0.0),
        }
    }

    /// Minimum eigenvalue of the structure tensor summed over a 3x3 window.
    ///
    /// ```text
    /// M = [ixx  ixy]   ixx = ∑Iₓ², iyy = ∑Iᵧ², ixy = ∑IₓIᵧ
    ///     [ixy  iyy]
    /// λ_min = (trace - √(trace² - 4·det)) / 2
    /// ```
    #[inline]
    fn response(level: &PyramidLevel, x: usize, y: usize) -> f32 {
        let (mut ixx, mut iyy, mut ixy) = (0.0f32, 0.0f32, 0.0f32);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                let (gx, gy) = level.gradient(nx, ny);
                ixx += gx * gx;
                iyy += gy * gy;
                ixy += gx * gy;
            }
        }
        let trace = ixx + iyy;
        let det = ixx * iyy - ixy * ixy;
        let discriminant = (trace * trace - 4.0 * det).max(0.0);
        0.5 * (trace - discriminant.sqrt())
    }
}

impl CornerDetector for ShiTomasiDetector {
    fn detect(&self, level: &PyramidLevel) -> Vec<FeatureSeed> {
        let width = level.width();
        let height = level.height();
        // One extra pixel so the 3x3 window and the local-max test stay inside.
        let border = self.grid.edge_margin.max(2);
        if width <= border * 2 || height <= border * 2 {
            return Vec::new();
        }
        let (x_lo, x_hi) = (border, width - border);
        let (y_lo, y_hi) = (border, height - border);

        // Response rows for [y_lo - 1, y_hi] so every candidate has neighbours.
        let responses: Vec<Vec<f32>> = (y_lo - 1..y_hi + 1)
            .into_par_iter()
            .map(|y| {
                (x_lo - 1..x_hi + 1)
                    .map(|x| Self::response(level, x, y))
                    .collect()
            })
            .collect();
        let at = |x: usize, y: usize| responses[y + 1 - y_lo][x + 1 - x_lo];

        let mut seeds = Vec::new();
        for y in y_lo..y_hi {
            for x in x_lo..x_hi {
                let score = at(x, y);
                if score < self.threshold || score <= 0.0 {
                    continue;
                }
                let mut is_max = true;
                'window: for ny in y - 1..=y + 1 {
                    for nx in x - 1..=x + 1 {
                        if (nx, ny) == (x, y) {
                            continue;
                        }
                        let neighbor = at(nx, ny);
                        if neighbor > score || (neighbor == score && (ny, nx) < (y, x)) {
                            is_max = false;
                            break 'window;
                        }
                    }
                }
                if is_max {
                    seeds.push(FeatureSeed {
                        octave: level.octave,
                        position: Vector2::new(x as f32, y as f32),
                        score,
                    });
                }
            }
        }

        if seeds.is_empty() {
            return seeds;
        }

        let cell = self.grid.cell_size.max(4);
        let cells_x = (x_hi - x_lo).div_ceil(cell);
        let cells_y = (y_hi - y_lo).div_ceil(cell);
        let seeds = distribute(seeds, &self.grid, x_lo, y_lo, cells_x, cells_y);
        trace!(
            "Shi-Tomasi kept {} corners in {}x{} (octave {})",
            seeds.len(),
            width,
            height,
            level.octave
        );
        seeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::build_pyramid;
    use image::{GrayImage, Luma};

    fn detector() -> ShiTomasiDetector {
        let grid = GridConfig {
            edge_margin: 4,
            ..GridConfig::default()
        };
        ShiTomasiDetector::new(grid, 10.0)
    }

    #[test]
    fn responds_to_checker_corner() {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            Luma([if (x >= 16) ^ (y >= 16) { 255 } else { 32 }])
        });
        let pyramid = build_pyramid(&img, 1, 1.0);
        let seeds = detector().detect(&pyramid.levels()[0]);
        assert!(
            seeds
                .iter()
                .any(|s| (s.position.x - 15.5).abs() <= 1.5 && (s.position.y - 15.5).abs() <= 1.5),
            "expected a corner at the checker junction: {seeds:?}"
        );
    }

    #[test]
    fn straight_edge_is_not_a_corner() {
        let img = GrayImage::from_fn(32, 32, |x, _| Luma([if x >= 16 { 255 } else { 32 }]));
        let pyramid = build_pyramid(&img, 1, 1.0);
        assert!(detector().detect(&pyramid.levels()[0]).is_empty());
    }
}
