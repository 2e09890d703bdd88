use image::imageops::{FilterType, resize};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::trace;

pub type GradientImage = ImageBuffer<Luma<i16>, Vec<i16>>;

#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub octave: usize,
    /// Level pixels per level-0 pixel (`1 / 2^octave`).
    pub scale: f32,
    pub image: GrayImage,
    pub grad_x: GradientImage,
    pub grad_y: GradientImage,
}

impl PyramidLevel {
    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }

    #[inline]
    pub fn intensity(&self, x: usize, y: usize) -> f32 {
        self.image.get_pixel(x as u32, y as u32).0[0] as f32
    }

    #[inline]
    pub fn gradient(&self, x: usize, y: usize) -> (f32, f32) {
        (
            self.grad_x.get_pixel(x as u32, y as u32).0[0] as f32,
            self.grad_y.get_pixel(x as u32, y as u32).0[0] as f32,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pyramid {
    levels: Vec<PyramidLevel>,
}

impl Pyramid {
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Builds a Gaussian pyramid with up to `octaves` levels, each half the size
/// of the previous one. Stops early once a level would drop below 2x2.
pub fn build_pyramid(base: &GrayImage, octaves: usize, blur_sigma: f32) -> Pyramid {
    let octaves = octaves.max(1);
    if base.width() == 0 || base.height() == 0 {
        trace!("Skipping pyramid for empty {}x{} image", base.width(), base.height());
        return Pyramid::default();
    }

    trace!(
        "Building pyramid with {} octaves from {}x{} image",
        octaves,
        base.width(),
        base.height()
    );

    let mut levels = Vec::with_capacity(octaves);
    let mut current = base.clone();

    for octave in 0..octaves {
        trace!("Processing octave {octave}");
        let blurred = if blur_sigma > 0.0 {
            gaussian_blur_f32(&current, blur_sigma)
        } else {
            current
        };
        let grad_x = scale_gradient(&horizontal_sobel(&blurred), 0.25);
        let grad_y = scale_gradient(&vertical_sobel(&blurred), 0.25);

        let next_size = (blurred.width() / 2, blurred.height() / 2);
        let next = (octave + 1 != octaves && next_size.0 >= 2 && next_size.1 >= 2)
            .then(|| resize(&blurred, next_size.0, next_size.1, FilterType::Triangle));

        levels.push(PyramidLevel {
            octave,
            scale: 1.0 / 2f32.powi(octave as i32),
            image: blurred,
            grad_x,
            grad_y,
        });

        match next {
            Some(next) => current = next,
            None => break,
        }
    }

    Pyramid { levels }
}

fn scale_gradient(grad: &GradientImage, scale: f32) -> GradientImage {
    let (width, height) = grad.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        Luma([(grad.get_pixel(x, y).0[0] as f32 * scale) as i16])
    })
}
