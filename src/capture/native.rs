//! Native camera source backed by nokhwa
//!
//! Maps [`CaptureBackend`] onto nokhwa's platform APIs. Decoded frames are
//! copied out as packed RGB so the rest of the pipeline does not depend on
//! nokhwa's own `image` version.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use tracing::debug;

use super::{CaptureBackend, CaptureError, CaptureSource, Frame};

/// An opened native camera stream
pub struct NativeCamera {
    camera: Camera,
    index: u32,
    open: bool,
}

impl NativeCamera {
    /// Open device `index` through `backend` and start streaming
    pub fn open(index: u32, backend: CaptureBackend) -> Result<Self, CaptureError> {
        let api = api_backend(backend).ok_or_else(|| CaptureError::Open {
            index,
            backend,
            reason: "not a native backend".to_string(),
        })?;

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::with_backend(CameraIndex::Index(index), requested, api)
            .map_err(|e| CaptureError::Open {
                index,
                backend,
                reason: e.to_string(),
            })?;
        camera.open_stream().map_err(|e| CaptureError::Open {
            index,
            backend,
            reason: e.to_string(),
        })?;

        Ok(Self {
            camera,
            index,
            open: true,
        })
    }
}

fn api_backend(backend: CaptureBackend) -> Option<ApiBackend> {
    match backend {
        CaptureBackend::Auto => Some(ApiBackend::Auto),
        CaptureBackend::Video4Linux => Some(ApiBackend::Video4Linux),
        CaptureBackend::MediaFoundation => Some(ApiBackend::MediaFoundation),
        CaptureBackend::AvFoundation => Some(ApiBackend::AVFoundation),
        CaptureBackend::Replay => None,
    }
}

impl CaptureSource for NativeCamera {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.open {
            return Ok(None);
        }

        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        let (width, height) = decoded.dimensions();
        Ok(Frame::from_rgb(decoded.into_raw(), width, height))
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        self.camera
            .set_resolution(Resolution::new(width, height))
            .map_err(|e| CaptureError::Backend(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open && self.camera.is_stream_open()
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.camera.stop_stream() {
                debug!("Stopping camera {} stream failed: {}", self.index, e);
            }
        }
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        self.release();
    }
}
