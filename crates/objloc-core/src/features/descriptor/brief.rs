use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{BinaryDescriptor, DESCRIPTOR_BYTES, DescriptorExtractor};
use crate::features::detect::FeatureSeed;
use crate::img::{PyramidLevel, sample_bilinear_clamped};

const TEST_COUNT: usize = DESCRIPTOR_BYTES * 8;
pub const DEFAULT_PATCH_RADIUS: usize = 15;
const PATTERN_SEED: u64 = 0x0b1e_c7_10c;

/// BRIEF binary descriptor over a disc of `patch_radius` pixels.
///
/// With `oriented` set this is the ORB variant: the test pattern is rotated by
/// the patch's intensity-centroid angle before sampling, making the descriptor
/// invariant to in-plane rotation. Without it the pattern stays axis-aligned
/// and the reported angle is always 0.
#[derive(Debug, Clone)]
pub struct BriefExtractor {
    patch_radius: usize,
    oriented: bool,
}

impl BriefExtractor {
    pub fn orb() -> Self {
        Self {
            patch_radius: DEFAULT_PATCH_RADIUS,
            oriented: true,
        }
    }

    pub fn upright() -> Self {
        Self {
            patch_radius: DEFAULT_PATCH_RADIUS,
            oriented: false,
        }
    }

    pub fn with_patch_radius(mut self, patch_radius: usize) -> Self {
        self.patch_radius = patch_radius.max(2);
        self
    }
}

impl DescriptorExtractor for BriefExtractor {
    fn describe(&self, level: &PyramidLevel, seed: &FeatureSeed) -> (f32, BinaryDescriptor) {
        let (cx, cy) = (seed.position.x, seed.position.y);
        let angle = if self.oriented {
            intensity_centroid_angle(level, cx, cy, self.patch_radius)
        } else {
            0.0
        };
        let (sin, cos) = angle.sin_cos();
        let scale = self.patch_radius as f32 / DEFAULT_PATCH_RADIUS as f32;

        let mut bytes = [0u8; DESCRIPTOR_BYTES];
        for (i, pair) in pattern().iter().enumerate() {
            let a = rotate(pair.a, sin, cos, scale);
            let b = rotate(pair.b, sin, cos, scale);
            let va = sample_bilinear_clamped(&level.image, cx + a.0, cy + a.1);
            let vb = sample_bilinear_clamped(&level.image, cx + b.0, cy + b.1);
            if va < vb {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        (angle, BinaryDescriptor(bytes))
    }
}

#[derive(Debug, Clone, Copy)]
struct TestPair {
    a: (f32, f32),
    b: (f32, f32),
}

/// The 256 point pairs, drawn once from a fixed seed inside the default disc.
fn pattern() -> &'static [TestPair] {
    static PATTERN: OnceLock<Vec<TestPair>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let r = DEFAULT_PATCH_RADIUS as f32;
        let mut point = || loop {
            let x = rng.gen_range(-r..=r);
            let y = rng.gen_range(-r..=r);
            if x * x + y * y <= r * r {
                break (x.round(), y.round());
            }
        };
        (0..TEST_COUNT)
            .map(|_| TestPair {
                a: point(),
                b: point(),
            })
            .collect()
    })
}

#[inline]
fn rotate(p: (f32, f32), sin: f32, cos: f32, scale: f32) -> (f32, f32) {
    let (x, y) = (p.0 * scale, p.1 * scale);
    (cos * x - sin * y, sin * x + cos * y)
}

/// Orientation of the vector from the keypoint to the intensity centroid of
/// the circular patch around it.
fn intensity_centroid_angle(level: &PyramidLevel, cx: f32, cy: f32, radius: usize) -> f32 {
    let r = radius as isize;
    let r2 = r * r;
    let (mut m10, mut m01) = (0.0f32, 0.0f32);
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let v = sample_bilinear_clamped(&level.image, cx + dx as f32, cy + dy as f32);
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    if m10.abs() < f32::EPSILON && m01.abs() < f32::EPSILON {
        0.0
    } else {
        m01.atan2(m10)
    }
}
