//! Image preprocessing for OCR
//!
//! Turns a cropped colour region into a black-text-on-white binary image:
//! grayscale, Gaussian blur, Gaussian-weighted adaptive threshold and a 2x2
//! morphological closing. Parameters are fixed; ID cards are a controlled
//! print medium so the same pipeline is applied to every frame.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use crate::capture::Frame;

/// Preprocessing parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    /// Sigma of the noise-suppression blur (a 5x5 kernel)
    pub blur_sigma: f32,
    /// Sigma of the local mean used by the adaptive threshold (an 11 pixel block)
    pub threshold_sigma: f32,
    /// Constant subtracted from the local mean
    pub threshold_offset: i16,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            // sigma = 0.3 * ((ksize - 1) * 0.5 - 1) + 0.8
            blur_sigma: 1.1,
            threshold_sigma: 2.0,
            threshold_offset: 2,
        }
    }
}

/// Fixed preprocessing pipeline
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    /// Run the pipeline on a cropped frame
    pub fn process(&self, region: &Frame) -> GrayImage {
        self.process_image(region.image())
    }

    /// Run the pipeline on an RGB image
    pub fn process_image(&self, image: &RgbImage) -> GrayImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return GrayImage::new(width, height);
        }

        let gray = image::imageops::grayscale(image);
        let blurred = blur(&gray, self.config.blur_sigma);
        let binary = adaptive_threshold_gaussian(
            &blurred,
            self.config.threshold_sigma,
            self.config.threshold_offset,
        );
        let cleaned = close_2x2(&binary);

        debug!("Preprocessed {}x{} region", width, height);
        cleaned
    }
}

fn blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        gaussian_blur_f32(image, sigma)
    } else {
        image.clone()
    }
}

/// Binarize against a Gaussian-weighted local mean: a pixel is white when it
/// is brighter than `local_mean - offset`.
pub fn adaptive_threshold_gaussian(image: &GrayImage, sigma: f32, offset: i16) -> GrayImage {
    let local_mean = blur(image, sigma);
    let mut output = GrayImage::new(image.width(), image.height());

    for (x, y, pixel) in image.enumerate_pixels() {
        let mean = local_mean.get_pixel(x, y)[0] as i16;
        let value = if pixel[0] as i16 > mean - offset {
            255
        } else {
            0
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Morphological closing of the white foreground with a 2x2 square kernel
/// anchored at its bottom-right cell. Fills single-pixel dark specks and gaps
/// while strokes two pixels wide survive.
pub fn close_2x2(image: &GrayImage) -> GrayImage {
    let dilated = apply_2x2(image, false);
    apply_2x2(&dilated, true)
}

/// `erode == false`: max over the window up-left of each pixel.
/// `erode == true`: min over the reflected window down-right of each pixel.
fn apply_2x2(image: &GrayImage, erode: bool) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let (dx, dy): (i64, i64) = if erode { (1, 1) } else { (-1, -1) };
        let mut value = image.get_pixel(x, y)[0];
        for (ox, oy) in [(dx, 0), (0, dy), (dx, dy)] {
            let nx = x as i64 + ox;
            let ny = y as i64 + oy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let neighbour = image.get_pixel(nx as u32, ny as u32)[0];
            value = if erode {
                value.min(neighbour)
            } else {
                value.max(neighbour)
            };
        }
        Luma([value])
    })
}
