//! Camera Capture Layer
//!
//! A [`CaptureSource`] wraps one opened camera device. Sources are created by a
//! [`DeviceProvider`] for a `(device index, backend)` pair, and the
//! [`AcquisitionManager`] layers device probing, backend fallback, read retries
//! and reconnects on top of them.

pub mod frame;
pub mod manager;
#[cfg(feature = "native-camera")]
pub mod native;
pub mod replay;

#[cfg(test)]
pub mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub use frame::Frame;
pub use manager::{AcquisitionConfig, AcquisitionManager};
pub use replay::ReplaySource;

/// Platform capture API used to open a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum CaptureBackend {
    /// Let the platform layer pick
    Auto,
    /// Video4Linux2 (Linux)
    #[serde(rename = "video4linux")]
    #[value(name = "video4linux")]
    Video4Linux,
    /// Microsoft Media Foundation (Windows)
    MediaFoundation,
    /// AVFoundation (macOS)
    AvFoundation,
    /// Still images replayed from a directory
    Replay,
}

impl CaptureBackend {
    /// Default backend priority for native cameras
    pub fn default_priority() -> Vec<CaptureBackend> {
        vec![
            CaptureBackend::MediaFoundation,
            CaptureBackend::Video4Linux,
            CaptureBackend::AvFoundation,
            CaptureBackend::Auto,
        ]
    }
}

impl fmt::Display for CaptureBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureBackend::Auto => "auto",
            CaptureBackend::Video4Linux => "video4linux",
            CaptureBackend::MediaFoundation => "media_foundation",
            CaptureBackend::AvFoundation => "av_foundation",
            CaptureBackend::Replay => "replay",
        };
        f.write_str(name)
    }
}

/// Whether the device behind a handle is currently held open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Open,
    Closed,
}

/// The camera currently owned by the acquisition manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraHandle {
    /// Device index the camera was opened at
    pub index: u32,
    /// Backend that successfully opened it
    pub backend: CaptureBackend,
    /// Open/closed status
    pub status: HandleStatus,
}

/// Errors raised by the capture layer
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No responsive camera across all probed indices and backends
    #[error("no responsive camera found (probed {probed} device indices)")]
    NoDeviceFound { probed: u32 },

    /// Frames could not be read even after retrying and reconnecting
    #[error("failed to read a frame after {attempts} attempts and a reconnect")]
    ReadFailure { attempts: u32 },

    /// A device could not be opened with the given backend
    #[error("failed to open camera {index} with backend {backend}: {reason}")]
    Open {
        index: u32,
        backend: CaptureBackend,
        reason: String,
    },

    /// The backend reported an error while streaming
    #[cfg(any(test, feature = "native-camera"))]
    #[error("capture backend error: {0}")]
    Backend(String),

    /// The requested operation is not supported by this source
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Frame file could not be decoded
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opened camera device
pub trait CaptureSource {
    /// Grab the next frame. `Ok(None)` means the driver returned nothing.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Ask the device for a capture resolution
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CaptureError>;

    /// Whether the device is still held open
    fn is_open(&self) -> bool;

    /// Release the device. Must be idempotent.
    fn release(&mut self);
}

/// Opens capture sources for a device index and backend
pub trait DeviceProvider {
    fn open(
        &mut self,
        index: u32,
        backend: CaptureBackend,
    ) -> Result<Box<dyn CaptureSource>, CaptureError>;
}

/// Device provider for the running system: native cameras (when compiled
/// with `native-camera`) and the replay backend.
#[derive(Debug, Clone, Default)]
pub struct SystemDevices {
    /// Directory replayed by the `replay` backend
    pub replay_dir: Option<PathBuf>,
    /// Delay between replayed frames
    pub replay_frame_interval: Duration,
}

impl SystemDevices {
    pub fn new(replay_dir: Option<PathBuf>, replay_frame_interval: Duration) -> Self {
        Self {
            replay_dir,
            replay_frame_interval,
        }
    }
}

impl DeviceProvider for SystemDevices {
    fn open(
        &mut self,
        index: u32,
        backend: CaptureBackend,
    ) -> Result<Box<dyn CaptureSource>, CaptureError> {
        match backend {
            CaptureBackend::Replay => {
                let dir = self.replay_dir.as_ref().ok_or_else(|| CaptureError::Open {
                    index,
                    backend,
                    reason: "no replay directory configured".to_string(),
                })?;
                // A replay directory is a single device
                if index != 0 {
                    return Err(CaptureError::Open {
                        index,
                        backend,
                        reason: "replay only provides device 0".to_string(),
                    });
                }
                let source = ReplaySource::open(dir, self.replay_frame_interval)?;
                Ok(Box::new(source))
            }
            native => open_native(index, native),
        }
    }
}

#[cfg(feature = "native-camera")]
fn open_native(
    index: u32,
    backend: CaptureBackend,
) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(Box::new(native::NativeCamera::open(index, backend)?))
}

#[cfg(not(feature = "native-camera"))]
fn open_native(
    index: u32,
    backend: CaptureBackend,
) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Err(CaptureError::Open {
        index,
        backend,
        reason: "native camera support not compiled in (enable the `native-camera` feature)"
            .to_string(),
    })
}
