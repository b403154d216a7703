//! Frame data structures for captured camera content

use image::RgbImage;
use std::time::Instant;

use crate::vision::ScanArea;

/// A captured frame from the camera
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel data
    image: RgbImage,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Create a new frame stamped with the current time
    pub fn new(image: RgbImage) -> Self {
        Self::with_timestamp(image, Instant::now())
    }

    /// Create a frame with an explicit capture time
    pub fn with_timestamp(image: RgbImage, timestamp: Instant) -> Self {
        Self { image, timestamp }
    }

    /// Build a frame from raw packed RGB bytes.
    /// Returns `None` when the buffer does not match the dimensions.
    #[cfg(any(test, feature = "native-camera"))]
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(Self::new)
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// A frame with no pixels is what some drivers hand back on a failed grab
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Borrow the pixel buffer
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Copy out the given area as a new frame with the same timestamp.
    /// The area is clipped to the frame bounds.
    pub fn crop(&self, area: &ScanArea) -> Frame {
        let (width, height) = self.dimensions();
        let x = area.x.min(width);
        let y = area.y.min(height);
        let w = area.width.min(width - x);
        let h = area.height.min(height - y);

        let region = image::imageops::crop_imm(&self.image, x, y, w, h).to_image();
        Frame::with_timestamp(region, self.timestamp)
    }
}
