use serde::{Deserialize, Serialize};

use crate::features::detect::FeatureSeed;
use crate::img::PyramidLevel;

pub mod brief;
pub use brief::BriefExtractor;

pub const DESCRIPTOR_BYTES: usize = 32;

/// 256-bit binary descriptor compared with Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryDescriptor(pub [u8; DESCRIPTOR_BYTES]);

impl BinaryDescriptor {
    #[inline]
    pub fn hamming(&self, other: &BinaryDescriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

pub trait DescriptorExtractor {
    /// Returns the patch orientation (radians) and the descriptor for a seed
    /// detected on `level`.
    fn describe(&self, level: &PyramidLevel, seed: &FeatureSeed) -> (f32, BinaryDescriptor);
}
