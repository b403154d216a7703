//! Replay capture source
//!
//! Plays back the still images of a directory in file-name order, looping
//! forever. Used for unattended demos and for exercising the whole pipeline
//! without a camera attached.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::{CaptureError, CaptureSource, Frame};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Directory-backed capture source
pub struct ReplaySource {
    frames: Vec<PathBuf>,
    position: usize,
    frame_interval: Duration,
    open: bool,
}

impl ReplaySource {
    /// Open a directory. Fails if it holds no images.
    pub fn open(dir: &Path, frame_interval: Duration) -> Result<Self, CaptureError> {
        let frames = list_images(dir)?;
        if frames.is_empty() {
            return Err(CaptureError::Unsupported(format!(
                "replay directory {:?} contains no images",
                dir
            )));
        }

        info!("Replaying {} images from {:?}", frames.len(), dir);
        Ok(Self {
            frames,
            position: 0,
            frame_interval,
            open: true,
        })
    }

    /// Number of images being replayed
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.open {
            return Ok(None);
        }
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }

        let path = &self.frames[self.position];
        self.position = (self.position + 1) % self.frames.len();

        debug!("Replay frame {:?}", path);
        let image = image::open(path)?.to_rgb8();
        Ok(Some(Frame::new(image)))
    }

    fn set_resolution(&mut self, _width: u32, _height: u32) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported(
            "replay frames keep their stored resolution".to_string(),
        ))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        self.open = false;
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, name: &str, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([200, 200, 200]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_replay_cycles_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", 4, 2);
        write_image(dir.path(), "a.png", 2, 2);
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source = ReplaySource::open(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(source.len(), 2);

        let sizes: Vec<(u32, u32)> = (0..3)
            .map(|_| source.next_frame().unwrap().unwrap().dimensions())
            .collect();
        assert_eq!(sizes, vec![(2, 2), (4, 2), (2, 2)]);
    }

    #[test]
    fn test_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplaySource::open(dir.path(), Duration::ZERO).is_err());
    }

    #[test]
    fn test_missing_directory_fails() {
        let result = ReplaySource::open(Path::new("/nonexistent/replay"), Duration::ZERO);
        assert!(matches!(result, Err(CaptureError::Io(_))));
    }

    #[test]
    fn test_released_source_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "card.png", 2, 2);

        let mut source = ReplaySource::open(dir.path(), Duration::ZERO).unwrap();
        source.release();
        assert!(!source.is_open());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.set_resolution(1280, 720).is_err());
    }
}
