//! Projects the reference boundary into the frame.

use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::geometry::Homography;

/// Four corners in order, frame pixel coordinates.
pub type Quadrilateral = [Vector2<f64>; 4];

/// Corners of a `width x height` reference image, clockwise from the origin.
pub fn image_boundary(width: u32, height: u32) -> Quadrilateral {
    let (w, h) = (width as f64, height as f64);
    [
        Vector2::new(0.0, 0.0),
        Vector2::new(w, 0.0),
        Vector2::new(w, h),
        Vector2::new(0.0, h),
    ]
}

/// Outcome of one localisation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectionResult {
    NotLocated,
    Located {
        quadrilateral: Quadrilateral,
        point: Vector2<f64>,
    },
}

impl DetectionResult {
    pub fn is_located(&self) -> bool {
        matches!(self, Self::Located { .. })
    }

    pub fn point(&self) -> Option<Vector2<f64>> {
        match self {
            Self::Located { point, .. } => Some(*point),
            Self::NotLocated => None,
        }
    }

    pub fn quadrilateral(&self) -> Option<&Quadrilateral> {
        match self {
            Self::Located { quadrilateral, .. } => Some(quadrilateral),
            Self::NotLocated => None,
        }
    }
}

/// Mean of the four vertices.
pub fn centroid(quad: &Quadrilateral) -> Vector2<f64> {
    quad.iter().sum::<Vector2<f64>>() / quad.len() as f64
}

/// Maps `boundary` through `homography`.
///
/// Any corner that lands at infinity or off the finite plane yields
/// [`DetectionResult::NotLocated`].
pub fn locate(homography: &Homography, boundary: &Quadrilateral) -> DetectionResult {
    let mut quadrilateral = [Vector2::zeros(); 4];
    for (slot, corner) in quadrilateral.iter_mut().zip(boundary) {
        match homography.project(corner) {
            Some(p) => *slot = p,
            None => {
                debug!("Boundary corner ({:.1}, {:.1}) projects to infinity", corner.x, corner.y);
                return DetectionResult::NotLocated;
            }
        }
    }
    DetectionResult::Located {
        point: centroid(&quadrilateral),
        quadrilateral,
    }
}
