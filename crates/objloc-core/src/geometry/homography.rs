//! Planar homography estimation.
//!
//! `H` maps reference-image pixels to frame pixels: `x_frame ~ H x_ref`.
//! [`estimate_dlt`] is the normalised direct linear transform;
//! [`HomographyEstimator`] wraps it in RANSAC over minimal 4-point samples.

use log::{debug, trace};
use nalgebra::{DMatrix, Matrix3, Vector2, Vector3};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_CORRESPONDENCES: usize = 4;

/// Sine of the smallest angle tolerated between two sides of a sample
/// triangle before the three points count as collinear.
const COLLINEAR_SINE: f64 = 1e-6;
/// Lower bound on |det(H / ‖H‖)| for a usable transform.
const SINGULAR_DET: f64 = 1e-10;
/// Projective weight below which a point is treated as mapped to infinity.
const MIN_PROJECTIVE_WEIGHT: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HomographyError {
    #[error("need at least {required} correspondences, got {found}")]
    InsufficientCorrespondences { found: usize, required: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
}

pub type Result<T> = std::result::Result<T, HomographyError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub reference: Vector2<f64>,
    pub frame: Vector2<f64>,
}

impl Correspondence {
    pub fn new(reference: Vector2<f64>, frame: Vector2<f64>) -> Self {
        Self { reference, frame }
    }
}

/// 3x3 projective transform from reference to frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Wraps a matrix, rejecting non-finite or singular ones.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self> {
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(HomographyError::DegenerateGeometry("non-finite transform"));
        }
        let norm = matrix.norm();
        if norm <= f64::EPSILON || (matrix / norm).determinant().abs() < SINGULAR_DET {
            return Err(HomographyError::DegenerateGeometry("singular transform"));
        }
        Ok(Self(matrix))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Maps a point through the transform; `None` when it lands at infinity.
    pub fn project(&self, point: &Vector2<f64>) -> Option<Vector2<f64>> {
        let p = self.0 * Vector3::new(point.x, point.y, 1.0);
        if !p.z.is_finite() || p.z.abs() < MIN_PROJECTIVE_WEIGHT {
            return None;
        }
        let projected = Vector2::new(p.x / p.z, p.y / p.z);
        (projected.x.is_finite() && projected.y.is_finite()).then_some(projected)
    }

    pub fn transfer_error(&self, c: &Correspondence) -> f64 {
        self.project(&c.reference)
            .map_or(f64::INFINITY, |p| (p - c.frame).norm())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Upper bound on sampling rounds.
    pub iterations: usize,
    /// Maximum frame-space reprojection error (pixels) for an inlier.
    pub inlier_tolerance_px: f64,
    /// Fewest inliers accepted for a located object (never below 4).
    pub min_inliers: usize,
    /// Stops early once the chance of having missed a better sample drops
    /// below `1 - confidence`.
    pub confidence: f64,
    /// Refit on all inliers of the best sample.
    pub refine: bool,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            iterations: 2000,
            inlier_tolerance_px: 3.0,
            min_inliers: MIN_CORRESPONDENCES,
            confidence: 0.995,
            refine: true,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomographyEstimate {
    pub homography: Homography,
    /// Indices into the correspondence slice passed to the estimator.
    pub inliers: Vec<usize>,
    pub mean_error_px: f64,
}

#[derive(Debug, Clone)]
pub struct HomographyEstimator {
    config: RansacConfig,
}

impl HomographyEstimator {
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    /// Robustly fits `H` to `correspondences`.
    ///
    /// Both error cases are ordinary "not visible this frame" outcomes.
    pub fn estimate(&self, correspondences: &[Correspondence]) -> Result<HomographyEstimate> {
        let n = correspondences.len();
        if n < MIN_CORRESPONDENCES {
            debug!("Homography needs {MIN_CORRESPONDENCES} correspondences, have {n}");
            return Err(HomographyError::InsufficientCorrespondences {
                found: n,
                required: MIN_CORRESPONDENCES,
            });
        }

        let min_inliers = self.config.min_inliers.max(MIN_CORRESPONDENCES);
        let tolerance = self.config.inlier_tolerance_px;
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        let mut max_iterations = self.config.iterations.max(1);
        let mut best: Option<(Homography, Vec<usize>, f64)> = None;
        let mut degenerate_samples = 0usize;

        let mut iteration = 0;
        while iteration < max_iterations {
            iteration += 1;
            let indices = sample(&mut rng, n, MIN_CORRESPONDENCES).into_vec();
            let subset: Vec<Correspondence> = indices.iter().map(|&i| correspondences[i]).collect();
            if is_degenerate_sample(&subset) {
                degenerate_samples += 1;
                continue;
            }
            let Ok(candidate) = estimate_dlt(&subset) else {
                degenerate_samples += 1;
                continue;
            };

            let (inliers, error_sum) = score(&candidate, correspondences, tolerance);
            let better = best.as_ref().is_none_or(|(_, best_inliers, best_error)| {
                inliers.len() > best_inliers.len()
                    || (inliers.len() == best_inliers.len() && error_sum < *best_error)
            });
            if better {
                trace!(
                    "RANSAC iteration {}: new best with {} inliers",
                    iteration,
                    inliers.len()
                );
                max_iterations = max_iterations.min(adaptive_iterations(
                    inliers.len() as f64 / n as f64,
                    self.config.confidence,
                    self.config.iterations,
                ));
                best = Some((candidate, inliers, error_sum));
            }
        }

        let Some((mut homography, mut inliers, mut error_sum)) = best else {
            debug!("RANSAC: all {degenerate_samples} samples were degenerate");
            return Err(HomographyError::DegenerateGeometry(
                "every sample was collinear or singular",
            ));
        };

        if self.config.refine && inliers.len() > MIN_CORRESPONDENCES {
            let inlier_set: Vec<Correspondence> =
                inliers.iter().map(|&i| correspondences[i]).collect();
            if let Ok(refined) = estimate_dlt(&inlier_set) {
                let (refined_inliers, refined_error) = score(&refined, correspondences, tolerance);
                if refined_inliers.len() >= inliers.len() {
                    homography = refined;
                    inliers = refined_inliers;
                    error_sum = refined_error;
                }
            }
        }

        if inliers.len() < min_inliers {
            debug!(
                "RANSAC: best model has {} inliers, need {}",
                inliers.len(),
                min_inliers
            );
            return Err(HomographyError::DegenerateGeometry("too few inliers"));
        }

        let mean_error_px = error_sum / inliers.len() as f64;
        debug!(
            "Homography: {}/{} inliers after {} iterations, mean error {:.3}px",
            inliers.len(),
            n,
            iteration,
            mean_error_px
        );
        Ok(HomographyEstimate {
            homography,
            inliers,
            mean_error_px,
        })
    }
}

/// Rounds needed to draw one all-inlier sample with the given confidence.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64, cap: usize) -> usize {
    if !(0.0..1.0).contains(&confidence) || confidence <= 0.0 {
        return cap;
    }
    let all_inliers = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
    if all_inliers >= 1.0 {
        return 1;
    }
    if all_inliers <= f64::EPSILON {
        return cap;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - all_inliers).ln();
    if needed.is_finite() {
        (needed.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

fn score(h: &Homography, correspondences: &[Correspondence], tolerance: f64) -> (Vec<usize>, f64) {
    let mut inliers = Vec::new();
    let mut error_sum = 0.0;
    for (idx, c) in correspondences.iter().enumerate() {
        let err = h.transfer_error(c);
        if err < tolerance {
            inliers.push(idx);
            error_sum += err;
        }
    }
    (inliers, error_sum)
}

fn is_degenerate_sample(subset: &[Correspondence]) -> bool {
    let refs: Vec<_> = subset.iter().map(|c| c.reference).collect();
    let frames: Vec<_> = subset.iter().map(|c| c.frame).collect();
    has_collinear_triple(&refs) || has_collinear_triple(&frames)
}

fn has_collinear_triple(points: &[Vector2<f64>]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let ab = points[j] - points[i];
                let ac = points[k] - points[i];
                let cross = ab.x * ac.y - ab.y * ac.x;
                if cross.abs() <= COLLINEAR_SINE * ab.norm() * ac.norm() {
                    return true;
                }
            }
        }
    }
    false
}

/// Hartley normalisation: centroid to the origin, mean distance √2.
fn normalization(points: &[Vector2<f64>]) -> Option<(Matrix3<f64>, Matrix3<f64>)> {
    let centroid = points.iter().sum::<Vector2<f64>>() / points.len() as f64;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / points.len() as f64;
    if !mean_dist.is_finite() || mean_dist <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let forward = Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let inverse = Matrix3::new(
        1.0 / s,
        0.0,
        centroid.x,
        0.0,
        1.0 / s,
        centroid.y,
        0.0,
        0.0,
        1.0,
    );
    Some((forward, inverse))
}

/// Normalised DLT over all given correspondences (at least 4).
pub fn estimate_dlt(correspondences: &[Correspondence]) -> Result<Homography> {
    let n = correspondences.len();
    if n < MIN_CORRESPONDENCES {
        return Err(HomographyError::InsufficientCorrespondences {
            found: n,
            required: MIN_CORRESPONDENCES,
        });
    }

    let refs: Vec<_> = correspondences.iter().map(|c| c.reference).collect();
    let frames: Vec<_> = correspondences.iter().map(|c| c.frame).collect();
    let (t_ref, _) = normalization(&refs)
        .ok_or(HomographyError::DegenerateGeometry("coincident reference points"))?;
    let (t_frame, t_frame_inv) = normalization(&frames)
        .ok_or(HomographyError::DegenerateGeometry("coincident frame points"))?;

    // Zero-padded to at least 9 rows so the SVD exposes the null vector.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (r, f)) in refs.iter().zip(frames.iter()).enumerate() {
        let r = t_ref * Vector3::new(r.x, r.y, 1.0);
        let f = t_frame * Vector3::new(f.x, f.y, 1.0);
        let (x, y) = (r.x, r.y);
        let (u, v) = (f.x, f.y);

        let r0 = 2 * i;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or(HomographyError::DegenerateGeometry("SVD did not converge"))?;
    let (null_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(HomographyError::DegenerateGeometry("empty SVD"))?;
    let h = v_t.row(null_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let mut h = t_frame_inv * h_norm * t_ref;
    let scale = h[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h /= scale;
    }
    Homography::from_matrix(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ground_truth() -> Homography {
        Homography(Matrix3::new(
            0.9, -0.12, 35.0, 0.08, 1.05, -12.0, 2e-4, -1e-4, 1.0,
        ))
    }

    fn grid_correspondences(h: &Homography) -> Vec<Correspondence> {
        let mut out = Vec::new();
        for gy in 0..6 {
            for gx in 0..7 {
                let r = Vector2::new(10.0 + 23.0 * gx as f64, 8.0 + 19.0 * gy as f64);
                out.push(Correspondence::new(r, h.project(&r).unwrap()));
            }
        }
        out
    }

    #[test]
    fn dlt_recovers_exact_transform_from_four_points() {
        let h = ground_truth();
        let corners = [
            Vector2::new(0.0, 0.0),
            Vector2::new(100.0, 0.0),
            Vector2::new(100.0, 80.0),
            Vector2::new(0.0, 80.0),
        ];
        let corrs: Vec<_> = corners
            .iter()
            .map(|r| Correspondence::new(*r, h.project(r).unwrap()))
            .collect();
        let estimated = estimate_dlt(&corrs).unwrap();
        assert_relative_eq!(*estimated.matrix(), *h.matrix(), epsilon = 1e-6);
    }

    #[test]
    fn dlt_rejects_coincident_points() {
        let p = Vector2::new(5.0, 5.0);
        let corrs = vec![Correspondence::new(p, p); 5];
        assert!(matches!(
            estimate_dlt(&corrs),
            Err(HomographyError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn too_few_correspondences() {
        let corrs = vec![Correspondence::new(Vector2::zeros(), Vector2::zeros()); 3];
        let err = HomographyEstimator::new(RansacConfig::default())
            .estimate(&corrs)
            .unwrap_err();
        assert_eq!(
            err,
            HomographyError::InsufficientCorrespondences {
                found: 3,
                required: 4
            }
        );
    }

    #[test]
    fn collinear_correspondences_are_degenerate() {
        let corrs: Vec<_> = (0..8)
            .map(|i| {
                let p = Vector2::new(i as f64 * 10.0, i as f64 * 5.0);
                Correspondence::new(p, p + Vector2::new(3.0, 4.0))
            })
            .collect();
        let err = HomographyEstimator::new(RansacConfig::default())
            .estimate(&corrs)
            .unwrap_err();
        assert!(matches!(err, HomographyError::DegenerateGeometry(_)));
    }

    #[test]
    fn ransac_ignores_outliers() {
        let h = ground_truth();
        let mut corrs = grid_correspondences(&h);
        let inlier_count = corrs.len();
        for i in 0..12 {
            let r = Vector2::new(15.0 + 11.0 * i as f64, 90.0 - 6.0 * i as f64);
            let bogus = Vector2::new(400.0 - 17.0 * i as f64, 30.0 + 29.0 * (i % 5) as f64);
            corrs.push(Correspondence::new(r, bogus));
        }

        let estimate = HomographyEstimator::new(RansacConfig::default())
            .estimate(&corrs)
            .unwrap();
        assert_eq!(estimate.inliers, (0..inlier_count).collect::<Vec<_>>());
        assert!(estimate.mean_error_px < 1e-6);
        let query = Vector2::new(60.0, 40.0);
        let expected = h.project(&query).unwrap();
        let actual = estimate.homography.project(&query).unwrap();
        assert_relative_eq!(actual, expected, epsilon = 1e-6);
    }

    #[test]
    fn estimation_is_repeatable_for_a_seed() {
        let mut corrs = grid_correspondences(&ground_truth());
        corrs.push(Correspondence::new(Vector2::new(1.0, 2.0), Vector2::new(300.0, 7.0)));
        let estimator = HomographyEstimator::new(RansacConfig::default());
        assert_eq!(estimator.estimate(&corrs), estimator.estimate(&corrs));
    }

    #[test]
    fn projection_at_infinity_is_none() {
        let h = Homography::from_matrix(Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.01, 0.0, 1.0))
            .unwrap();
        assert!(h.project(&Vector2::new(-100.0, 3.0)).is_none());
        assert!(h.project(&Vector2::new(0.0, 3.0)).is_some());
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert!(Homography::from_matrix(m).is_err());
    }

    #[test]
    fn adaptive_iterations_shrink_with_inlier_ratio() {
        assert_eq!(adaptive_iterations(1.0, 0.995, 2000), 1);
        assert!(adaptive_iterations(0.8, 0.995, 2000) < adaptive_iterations(0.4, 0.995, 2000));
        assert_eq!(adaptive_iterations(0.0, 0.995, 2000), 2000);
    }
}
