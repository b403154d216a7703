//! Vision/OCR Layer
//!
//! Turns a captured frame into raw text: crop the scan area, binarize the
//! crop and hand it to the OCR engine.

pub mod ocr;
pub mod preprocess;
pub mod scan_area;

use std::time::Instant;
use tracing::debug;

use crate::capture::Frame;

pub use ocr::{OcrEngine, OcrError, TesseractConfig, TesseractOcr};
pub use preprocess::Preprocessor;
pub use scan_area::{ScanArea, ScanAreaCalculator, ScanProfile, ScanTier};

/// Result of one vision pass over a frame
#[derive(Debug, Clone)]
pub struct VisionResult {
    /// Recognized text, possibly empty
    pub text: String,
    /// Scan area the text was read from
    pub area: ScanArea,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Crop, preprocess and recognize
pub struct VisionPipeline {
    calculator: ScanAreaCalculator,
    preprocessor: Preprocessor,
    engine: Box<dyn OcrEngine>,
}

impl VisionPipeline {
    pub fn new(
        calculator: ScanAreaCalculator,
        preprocessor: Preprocessor,
        engine: Box<dyn OcrEngine>,
    ) -> Self {
        debug!("Scan area aspect ratio {:.2}", calculator.aspect_ratio());
        Self {
            calculator,
            preprocessor,
            engine,
        }
    }

    /// Scan area for a frame of the given size
    pub fn scan_area(&self, width: u32, height: u32) -> ScanArea {
        self.calculator.compute(width, height)
    }

    /// Run one recognition pass over the scan area of `frame`
    pub fn process(&mut self, frame: &Frame) -> Result<VisionResult, OcrError> {
        let start = Instant::now();
        let area = self.scan_area(frame.width(), frame.height());

        let region = frame.crop(&area);
        let text = if region.is_empty() {
            String::new()
        } else {
            let binary = self.preprocessor.process(&region);
            self.engine.recognize(&binary)?
        };

        let processing_time = start.elapsed();
        debug!(
            "Vision pass over {}x{} at ({}, {}) complete in {:?}",
            area.width, area.height, area.x, area.y, processing_time
        );

        Ok(VisionResult {
            text,
            area,
            processing_time_ms: processing_time.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, RgbImage};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records the size of every image it is asked to read
    struct RecordingOcr {
        seen: Rc<RefCell<Vec<(u32, u32)>>>,
        reply: String,
    }

    impl OcrEngine for RecordingOcr {
        fn recognize(&mut self, image: &GrayImage) -> Result<String, OcrError> {
            self.seen.borrow_mut().push(image.dimensions());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_pipeline_reads_scan_area_only() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = VisionPipeline::new(
            ScanAreaCalculator::default(),
            Preprocessor::default(),
            Box::new(RecordingOcr {
                seen: seen.clone(),
                reply: "NAME: JUAN".to_string(),
            }),
        );

        let frame = Frame::new(RgbImage::from_pixel(640, 480, Rgb([255, 255, 255])));
        let result = pipeline.process(&frame).unwrap();

        assert_eq!(result.text, "NAME: JUAN");
        assert_eq!(result.area, pipeline.scan_area(640, 480));
        assert_eq!(*seen.borrow(), vec![(320, 145)]);
    }

    #[test]
    fn test_empty_frame_skips_engine() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = VisionPipeline::new(
            ScanAreaCalculator::default(),
            Preprocessor::default(),
            Box::new(RecordingOcr {
                seen: seen.clone(),
                reply: "unused".to_string(),
            }),
        );

        let frame = Frame::new(RgbImage::new(0, 0));
        let result = pipeline.process(&frame).unwrap();
        assert!(result.text.is_empty());
        assert!(seen.borrow().is_empty());
    }
}
