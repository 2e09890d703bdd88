pub mod homography;

pub use homography::{
    Correspondence, Homography, HomographyError, HomographyEstimate, HomographyEstimator,
    RansacConfig, estimate_dlt,
};
