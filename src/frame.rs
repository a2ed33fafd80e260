//! Captured frames and the image measurements taken on them.

use crate::crop::PixelCrop;
use crate::{Error, Result};
use image::{ColorType, DynamicImage, GrayImage};
use std::time::Instant;

/// Pixel layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit grayscale
    Luma8,
    /// 8-bit RGB
    Rgb8,
    /// 8-bit RGBA
    Rgba8,
    /// Anything else the image crate can hold
    Other,
}

impl From<ColorType> for PixelFormat {
    fn from(color: ColorType) -> Self {
        match color {
            ColorType::L8 => Self::Luma8,
            ColorType::Rgb8 => Self::Rgb8,
            ColorType::Rgba8 => Self::Rgba8,
            _ => Self::Other,
        }
    }
}

/// One captured image. Never mutated after publication.
#[derive(Debug, Clone)]
pub struct Frame {
    image: DynamicImage,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap an image captured now
    #[must_use]
    pub fn new(image: DynamicImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Wrap a grayscale buffer
    #[must_use]
    pub fn from_luma(image: GrayImage, sequence: u64) -> Self {
        Self::new(DynamicImage::ImageLuma8(image), sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.image.color().into()
    }

    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub const fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub const fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Copy out a square region
    ///
    /// # Errors
    ///
    /// Returns an error if the region leaves the frame
    pub fn crop(&self, region: &PixelCrop) -> Result<Self> {
        if !region.fits(self.width(), self.height()) {
            return Err(Error::InvalidInput(format!(
                "Crop {:?} exceeds frame {}x{}",
                region,
                self.width(),
                self.height()
            )));
        }
        Ok(Self {
            image: self.image.crop_imm(region.x, region.y, region.size, region.size),
            sequence: self.sequence,
            captured_at: self.captured_at,
        })
    }

    /// Focus score: variance of the 4-neighbour Laplacian over the luma plane.
    ///
    /// Higher is sharper. Frames smaller than 3x3 score zero.
    #[must_use]
    pub fn sharpness(&self) -> f64 {
        laplacian_variance(&self.image.to_luma8())
    }
}

#[allow(clippy::cast_precision_loss)] // Pixel counts fit comfortably in f64
fn laplacian_variance(luma: &GrayImage) -> f64 {
    let (width, height) = (luma.width() as usize, luma.height() as usize);
    if width < 3 || height < 3 {
        return 0.0;
    }

    let pixels = luma.as_raw();
    let at = |x: usize, y: usize| f64::from(pixels[y * width + x]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let response = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let count = ((width - 2) * (height - 2)) as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(size: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_dimensions_and_format() {
        let frame = Frame::from_luma(GrayImage::new(64, 48), 7);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.pixel_format(), PixelFormat::Luma8);
        assert_eq!(frame.sequence(), 7);
    }

    #[test]
    fn test_crop() {
        let frame = Frame::from_luma(checkerboard(64, 8), 1);
        let cropped = frame.crop(&PixelCrop::new(8, 16, 32)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (32, 32));
        assert!(frame.crop(&PixelCrop::new(40, 0, 32)).is_err());
    }

    #[test]
    fn test_flat_image_has_zero_sharpness() {
        let frame = Frame::from_luma(GrayImage::from_pixel(32, 32, Luma([128])), 0);
        assert_eq!(frame.sharpness(), 0.0);
    }

    #[test]
    fn test_blur_reduces_sharpness() {
        let sharp = checkerboard(64, 4);
        let blurred = image::imageops::blur(&sharp, 2.0);
        let sharp_score = Frame::from_luma(sharp, 0).sharpness();
        let blurred_score = Frame::from_luma(blurred, 0).sharpness();
        assert!(sharp_score > blurred_score, "{sharp_score} <= {blurred_score}");
    }

    #[test]
    fn test_tiny_frame() {
        assert_eq!(Frame::from_luma(GrayImage::new(2, 2), 0).sharpness(), 0.0);
    }
}
