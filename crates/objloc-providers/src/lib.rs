pub mod camera;

pub use camera::{
    CameraProvider, DecodedFrame, FrameDecodeError, FrameSample, PixelFormat, RawFrame,
};
