use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_line_segment_mut};
use log::{trace, warn};
use nalgebra::Vector2;
use objloc_core::DetectionResult;
use objloc_engine::{CycleReport, DetectionSink};
use objloc_providers::DecodedFrame;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);

/// Draws the located quadrilateral onto each frame and writes it as PNG.
pub struct OverlayRenderer {
    dir: PathBuf,
    written: usize,
}

impl OverlayRenderer {
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn frame_path(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("frame_{sequence:06}.png"))
    }
}

/// Clips the segment `a`-`b` to the box `[-1, width] x [-1, height]`
/// (Liang-Barsky). `None` when nothing of it is on the canvas.
fn clip_segment(
    a: Vector2<f64>,
    b: Vector2<f64>,
    width: f64,
    height: f64,
) -> Option<(Vector2<f64>, Vector2<f64>)> {
    if !(a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite()) {
        return None;
    }
    let d = b - a;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-d.x, a.x + 1.0),
        (d.x, width - a.x),
        (-d.y, a.y + 1.0),
        (d.y, height - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    (t0 <= t1).then(|| (a + d * t0, a + d * t1))
}

/// Copy of `frame` with the detection drawn on it. Frames without a
/// location come back unchanged.
pub fn render(frame: &RgbImage, result: &DetectionResult) -> RgbImage {
    let mut canvas = frame.clone();
    if let DetectionResult::Located {
        quadrilateral,
        point,
    } = result
    {
        let (width, height) = (frame.width() as f64, frame.height() as f64);
        for (i, a) in quadrilateral.iter().enumerate() {
            let b = quadrilateral[(i + 1) % quadrilateral.len()];
            if let Some((a, b)) = clip_segment(*a, b, width, height) {
                draw_line_segment_mut(
                    &mut canvas,
                    (a.x as f32, a.y as f32),
                    (b.x as f32, b.y as f32),
                    OUTLINE,
                );
            }
        }
        if (0.0..width).contains(&point.x) && (0.0..height).contains(&point.y) {
            draw_cross_mut(&mut canvas, OUTLINE, point.x.round() as i32, point.y.round() as i32);
        }
    }
    canvas
}

impl DetectionSink for OverlayRenderer {
    fn on_detection(&mut self, frame: &DecodedFrame, report: &CycleReport) {
        let path = self.frame_path(frame.sequence);
        match render(&frame.color, &report.result).save(&path) {
            Ok(()) => {
                self.written += 1;
                trace!("Wrote {}", path.display());
            }
            Err(err) => warn!("Failed to write overlay {}: {}", path.display(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_result_draws_green_outline() {
        let frame = RgbImage::from_pixel(40, 40, Rgb([10, 10, 10]));
        let result = DetectionResult::Located {
            quadrilateral: [
                Vector2::new(5.0, 5.0),
                Vector2::new(30.0, 5.0),
                Vector2::new(30.0, 30.0),
                Vector2::new(5.0, 30.0),
            ],
            point: Vector2::new(17.5, 17.5),
        };
        let canvas = render(&frame, &result);
        assert_eq!(canvas.get_pixel(15, 5), &OUTLINE);
        assert_eq!(canvas.get_pixel(30, 20), &OUTLINE);
        assert_eq!(canvas.get_pixel(10, 20), &Rgb([10, 10, 10]));
    }

    #[test]
    fn far_off_quadrilateral_is_clipped_to_the_frame() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
        let result = DetectionResult::Located {
            quadrilateral: [
                Vector2::new(5.0, 5.0),
                Vector2::new(3.0e9, 5.0),
                Vector2::new(3.0e9, 3.0e9),
                Vector2::new(5.0, 30.0),
            ],
            point: Vector2::new(1.5e9, 7.5e8),
        };
        let canvas = render(&frame, &result);
        assert_eq!(canvas.get_pixel(20, 5), &OUTLINE);
        assert_eq!(canvas.get_pixel(63, 5), &OUTLINE);
        assert_eq!(canvas.get_pixel(5, 20), &OUTLINE);
        assert_eq!(canvas.get_pixel(30, 40), &Rgb([10, 10, 10]));
    }

    #[test]
    fn clip_drops_segments_outside_the_frame() {
        let (w, h) = (64.0, 48.0);
        assert!(clip_segment(Vector2::new(-50.0, -50.0), Vector2::new(-10.0, 100.0), w, h).is_none());
        let (a, b) = clip_segment(Vector2::new(-100.0, 10.0), Vector2::new(200.0, 10.0), w, h)
            .unwrap();
        assert!((a.x + 1.0).abs() < 1e-9 && a.y == 10.0);
        assert!((b.x - 64.0).abs() < 1e-9 && b.y == 10.0);
    }

    #[test]
    fn not_located_leaves_frame_untouched() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        assert_eq!(render(&frame, &DetectionResult::NotLocated), frame);
    }
}
