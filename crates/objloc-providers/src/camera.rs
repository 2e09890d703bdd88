use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage};
use log::trace;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
    Rgb8,
    Gray8,
    /// Compressed container (PNG, JPEG, ...) identified by its magic bytes.
    Encoded,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats; `None` for encoded data.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => Some(4),
            PixelFormat::Rgb8 => Some(3),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Encoded => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame has zero size ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("row stride {bytes_per_row} is shorter than {required} bytes")]
    StrideTooSmall { bytes_per_row: usize, required: usize },
    #[error("frame buffer holds {actual} bytes, need {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("frame layout {width}x{height} with stride {bytes_per_row} overflows the address space")]
    LayoutOverflow {
        width: u32,
        height: u32,
        bytes_per_row: usize,
    },
    #[error("cannot decode frame: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, FrameDecodeError>;

/// Frame as delivered by the ingestion layer, before timestamps are attached.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub bytes_per_row: usize,
    pub data: Arc<[u8]>,
}

impl RawFrame {
    pub fn packed(width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) -> Self {
        let bytes_per_row = pixel_format.bytes_per_pixel().unwrap_or(0) * width as usize;
        Self {
            width,
            height,
            pixel_format,
            bytes_per_row,
            data: Arc::from(data),
        }
    }

    /// Compressed bytes; dimensions are known only after decoding.
    pub fn encoded(data: Vec<u8>) -> Self {
        Self {
            width: 0,
            height: 0,
            pixel_format: PixelFormat::Encoded,
            bytes_per_row: 0,
            data: Arc::from(data),
        }
    }
}

/// A captured frame, immutable once stamped.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub sequence: u64,
    /// Time since the provider started.
    pub captured_at: Duration,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub bytes_per_row: usize,
    pub data: Arc<[u8]>,
}

/// Grayscale view for feature work and colour view for output.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub sequence: u64,
    pub captured_at: Duration,
    pub gray: GrayImage,
    pub color: RgbImage,
}

impl DecodedFrame {
    pub fn from_color(sequence: u64, captured_at: Duration, color: RgbImage) -> Self {
        let gray = DynamicImage::ImageRgb8(color.clone()).to_luma8();
        Self {
            sequence,
            captured_at,
            gray,
            color,
        }
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

impl FrameSample {
    /// Interprets the pixel data. Never panics on malformed input.
    pub fn decode(&self) -> Result<DecodedFrame> {
        let color = match self.pixel_format {
            PixelFormat::Encoded => image::load_from_memory(&self.data)?.to_rgb8(),
            PixelFormat::Gray8 => {
                let rows = self.rows(1)?;
                ImageBuffer::from_fn(self.width, self.height, |x, y| {
                    let v = rows[y as usize * self.bytes_per_row + x as usize];
                    Rgb([v, v, v])
                })
            }
            PixelFormat::Rgb8 => self.packed_rgb(3, [0, 1, 2])?,
            PixelFormat::Rgba8 => self.packed_rgb(4, [0, 1, 2])?,
            PixelFormat::Bgra8 => self.packed_rgb(4, [2, 1, 0])?,
        };

        if color.width() == 0 || color.height() == 0 {
            return Err(FrameDecodeError::Empty {
                width: color.width(),
                height: color.height(),
            });
        }
        trace!(
            "Decoded frame {} ({}x{}, {:?})",
            self.sequence,
            color.width(),
            color.height(),
            self.pixel_format
        );
        Ok(DecodedFrame::from_color(self.sequence, self.captured_at, color))
    }

    fn packed_rgb(&self, bpp: usize, channels: [usize; 3]) -> Result<RgbImage> {
        let rows = self.rows(bpp)?;
        Ok(ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let base = y as usize * self.bytes_per_row + x as usize * bpp;
            Rgb(channels.map(|c| rows[base + c]))
        }))
    }

    /// Validates the packed layout and returns the backing bytes.
    fn rows(&self, bpp: usize) -> Result<&[u8]> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameDecodeError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        let overflow = || FrameDecodeError::LayoutOverflow {
            width: self.width,
            height: self.height,
            bytes_per_row: self.bytes_per_row,
        };
        let required = (self.width as usize).checked_mul(bpp).ok_or_else(overflow)?;
        if self.bytes_per_row < required {
            return Err(FrameDecodeError::StrideTooSmall {
                bytes_per_row: self.bytes_per_row,
                required,
            });
        }
        // Every pixel index is below `expected`, so indexing cannot overflow.
        let expected = self
            .bytes_per_row
            .checked_mul(self.height as usize - 1)
            .and_then(|rows| rows.checked_add(required))
            .ok_or_else(overflow)?;
        if self.data.len() < expected {
            return Err(FrameDecodeError::Truncated {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(&self.data)
    }
}

/// Stamps incoming frames with a sequence number and a monotonic capture time.
#[derive(Debug, Clone)]
pub struct CameraProvider {
    started: Instant,
    next_sequence: u64,
}

impl Default for CameraProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraProvider {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            next_sequence: 0,
        }
    }

    pub fn ingest_frame(&mut self, frame: RawFrame) -> FrameSample {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        FrameSample {
            sequence,
            captured_at: self.started.elapsed(),
            width: frame.width,
            height: frame.height,
            pixel_format: frame.pixel_format,
            bytes_per_row: frame.bytes_per_row,
            data: frame.data,
        }
    }
}
