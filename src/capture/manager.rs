//! Camera acquisition with backend fallback, read retries and reconnects

use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    CameraHandle, CaptureBackend, CaptureError, CaptureSource, DeviceProvider, Frame, HandleStatus,
};

/// Acquisition policy
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Device indices `0..probe_count` are probed
    pub probe_count: u32,
    /// Backend used for the initial responsiveness probe
    pub probe_backend: CaptureBackend,
    /// Pause between probing two indices
    pub probe_delay: Duration,
    /// Backends tried in order for each responsive index
    pub backends: Vec<CaptureBackend>,
    /// Pause after releasing a device before trying the next backend
    pub backend_switch_delay: Duration,
    /// Resolution requested once a camera is accepted (best effort)
    pub target_resolution: Option<(u32, u32)>,
    /// Read attempts before falling back to a reconnect
    pub read_retries: u32,
    /// Pause between two read attempts
    pub retry_delay: Duration,
    /// Pause between releasing the device and reacquiring it
    pub reconnect_delay: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            probe_count: 5,
            probe_backend: CaptureBackend::Auto,
            probe_delay: Duration::from_millis(100),
            backends: CaptureBackend::default_priority(),
            backend_switch_delay: Duration::from_millis(200),
            target_resolution: Some((1280, 720)),
            read_retries: 3,
            retry_delay: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Owns the camera device and keeps frames flowing across driver failures
pub struct AcquisitionManager {
    provider: Box<dyn DeviceProvider>,
    config: AcquisitionConfig,
    source: Option<Box<dyn CaptureSource>>,
    handle: Option<CameraHandle>,
}

impl AcquisitionManager {
    /// Create a manager. No device is opened until [`acquire`](Self::acquire).
    pub fn new(provider: Box<dyn DeviceProvider>, config: AcquisitionConfig) -> Self {
        Self {
            provider,
            config,
            source: None,
            handle: None,
        }
    }

    /// The camera currently held, if any
    #[cfg(test)]
    pub fn handle(&self) -> Option<&CameraHandle> {
        self.handle.as_ref()
    }

    /// Find device indices that open and deliver at least one frame
    pub fn find_available_cameras(&mut self) -> Vec<u32> {
        let mut available = Vec::new();

        for index in 0..self.config.probe_count {
            match self.provider.open(index, self.config.probe_backend) {
                Ok(mut source) => {
                    if matches!(source.next_frame(), Ok(Some(ref frame)) if !frame.is_empty()) {
                        info!("Found working camera at index {}", index);
                        available.push(index);
                    }
                    source.release();
                }
                Err(e) => debug!("Probe of camera {} failed: {}", index, e),
            }
            pause(self.config.probe_delay);
        }

        available
    }

    /// Select a camera: probe indices, then try each backend in priority order
    /// and keep the first one that opens and returns a non-empty frame.
    pub fn acquire(&mut self) -> Result<CameraHandle, CaptureError> {
        info!("Initializing camera...");
        self.release();

        let available = self.find_available_cameras();
        if available.is_empty() {
            warn!("No cameras found");
            return Err(CaptureError::NoDeviceFound {
                probed: self.config.probe_count,
            });
        }

        let backends = self.config.backends.clone();
        for index in available {
            info!("Trying camera index {}...", index);

            for &backend in &backends {
                debug!("  Trying backend: {}", backend);
                let mut source = match self.provider.open(index, backend) {
                    Ok(source) => source,
                    Err(e) => {
                        debug!("  Backend {} failed: {}", backend, e);
                        continue;
                    }
                };

                match source.next_frame() {
                    Ok(Some(frame)) if !frame.is_empty() => {
                        info!(
                            "Camera {} working with backend {} ({}x{})",
                            index,
                            backend,
                            frame.width(),
                            frame.height()
                        );
                        if let Some((width, height)) = self.config.target_resolution {
                            if let Err(e) = source.set_resolution(width, height) {
                                debug!("Could not apply {}x{}: {}", width, height, e);
                            }
                        }

                        let handle = CameraHandle {
                            index,
                            backend,
                            status: HandleStatus::Open,
                        };
                        self.source = Some(source);
                        self.handle = Some(handle.clone());
                        return Ok(handle);
                    }
                    Ok(_) => debug!("  Backend {} opened but returned no frame", backend),
                    Err(e) => debug!("  Backend {} read failed: {}", backend, e),
                }

                source.release();
                pause(self.config.backend_switch_delay);
            }
        }

        warn!("Failed to initialize any camera");
        Err(CaptureError::NoDeviceFound {
            probed: self.config.probe_count,
        })
    }

    /// Release the current device, wait, and acquire again
    pub fn reconnect(&mut self) -> Result<CameraHandle, CaptureError> {
        info!("Attempting to reconnect camera...");
        if self.source.is_some() {
            self.release();
            pause(self.config.reconnect_delay);
        }
        self.acquire()
    }

    /// Read one frame, retrying a bounded number of times and reconnecting
    /// once if every attempt fails.
    pub fn read(&mut self) -> Result<Frame, CaptureError> {
        let retries = self.config.read_retries;
        let mut attempts = 0;

        while attempts < retries {
            if !self.is_open() {
                warn!("Camera not opened, attempting to reconnect...");
                if let Err(e) = self.reconnect() {
                    warn!("Reconnect failed: {}", e);
                    return Err(CaptureError::ReadFailure { attempts });
                }
            }

            match self.read_once() {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {
                    attempts += 1;
                    warn!("Failed to read frame (attempt {}/{})", attempts, retries);
                }
                Err(e) => {
                    attempts += 1;
                    warn!("Error reading frame (attempt {}/{}): {}", attempts, retries, e);
                }
            }
            pause(self.config.retry_delay);
        }

        warn!("All frame read attempts failed, trying to reconnect camera...");
        if let Err(e) = self.reconnect() {
            warn!("Reconnect failed: {}", e);
            return Err(CaptureError::ReadFailure { attempts });
        }

        match self.read_once() {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(CaptureError::ReadFailure {
                attempts: attempts + 1,
            }),
            Err(e) => {
                warn!("Read after reconnect failed: {}", e);
                Err(CaptureError::ReadFailure {
                    attempts: attempts + 1,
                })
            }
        }
    }

    /// Release the device. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            debug!("Camera released");
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.status = HandleStatus::Closed;
        }
    }

    fn is_open(&self) -> bool {
        self.source.as_ref().is_some_and(|source| source.is_open())
    }

    /// Single read; an empty frame counts as no frame
    fn read_once(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        Ok(source.next_frame()?.filter(|frame| !frame.is_empty()))
    }
}

impl Drop for AcquisitionManager {
    fn drop(&mut self) {
        self.release();
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{Read, ScriptedDevices};
    use crate::capture::CaptureBackend::{Auto, MediaFoundation, Video4Linux};

    fn fast_config(backends: Vec<CaptureBackend>) -> AcquisitionConfig {
        AcquisitionConfig {
            probe_count: 3,
            probe_backend: Auto,
            probe_delay: Duration::ZERO,
            backends,
            backend_switch_delay: Duration::ZERO,
            target_resolution: Some((1280, 720)),
            read_retries: 3,
            retry_delay: Duration::ZERO,
            reconnect_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_no_device_found() {
        let devices = ScriptedDevices::new();
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));

        let result = manager.acquire();
        assert!(matches!(result, Err(CaptureError::NoDeviceFound { probed: 3 })));
        assert!(manager.handle().is_none());
    }

    #[test]
    fn test_probe_skips_unresponsive_index() {
        // Index 0 opens but never yields a frame; index 1 works
        let devices = ScriptedDevices::new()
            .device(0, Auto, [], Read::Empty)
            .device(1, Auto, [], Read::Frame(640, 480));
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));

        assert_eq!(manager.find_available_cameras(), vec![1]);
    }

    #[test]
    fn test_backend_fallback_order() {
        // Media Foundation opens but returns nothing, V4L2 works
        let devices = ScriptedDevices::new()
            .device(0, Auto, [], Read::Frame(640, 480))
            .device(0, MediaFoundation, [], Read::Empty)
            .device(0, Video4Linux, [], Read::Frame(640, 480));
        let journal = devices.journal.clone();
        let mut manager = AcquisitionManager::new(
            Box::new(devices),
            fast_config(vec![MediaFoundation, Video4Linux, Auto]),
        );

        let handle = manager.acquire().unwrap();
        assert_eq!(handle.index, 0);
        assert_eq!(handle.backend, Video4Linux);
        assert_eq!(handle.status, HandleStatus::Open);

        let journal = journal.borrow();
        assert_eq!(
            journal.opens,
            vec![(0, Auto), (0, MediaFoundation), (0, Video4Linux)]
        );
        // Probe source and the rejected Media Foundation source were released
        assert_eq!(journal.releases, 2);
        assert_eq!(journal.resolution_requests, vec![(1280, 720)]);
    }

    #[test]
    fn test_resolution_failure_is_not_fatal() {
        let devices = ScriptedDevices::new()
            .device(0, Auto, [], Read::Frame(640, 480))
            .rejecting_resolution();
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));

        assert!(manager.acquire().is_ok());
    }

    #[test]
    fn test_read_succeeds_on_later_retry() {
        // probe + acquire consume two frames, then two failed reads, then a frame
        let devices = ScriptedDevices::new().device(
            0,
            Auto,
            [
                Read::Frame(640, 480),
                Read::Frame(640, 480),
                Read::Empty,
                Read::Error,
                Read::Frame(320, 240),
            ],
            Read::Empty,
        );
        let journal = devices.journal.clone();
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));
        manager.acquire().unwrap();

        let frame = manager.read().unwrap();
        assert_eq!(frame.dimensions(), (320, 240));
        // No reconnect: only the probe and the accepted open happened
        assert_eq!(journal.borrow().opens.len(), 2);
    }

    #[test]
    fn test_read_reconnects_after_exhausting_retries() {
        let devices = ScriptedDevices::new().device(
            0,
            Auto,
            [
                // initial probe + acquire
                Read::Frame(640, 480),
                Read::Frame(640, 480),
                // three failed reads
                Read::Empty,
                Read::Empty,
                Read::Empty,
                // reconnect probe + acquire, then the final read
                Read::Frame(640, 480),
                Read::Frame(640, 480),
                Read::Frame(800, 600),
            ],
            Read::Empty,
        );
        let journal = devices.journal.clone();
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));
        manager.acquire().unwrap();

        let frame = manager.read().unwrap();
        assert_eq!(frame.dimensions(), (800, 600));
        assert_eq!(journal.borrow().opens.len(), 4);
    }

    #[test]
    fn test_read_failure_when_reconnect_fails() {
        let devices = ScriptedDevices::new().device(
            0,
            Auto,
            [Read::Frame(640, 480), Read::Frame(640, 480)],
            Read::Empty,
        );
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));
        manager.acquire().unwrap();

        let result = manager.read();
        assert!(matches!(result, Err(CaptureError::ReadFailure { attempts: 3 })));
    }

    #[test]
    fn test_read_without_camera_tries_to_connect() {
        let devices = ScriptedDevices::new().device(0, Auto, [], Read::Frame(640, 480));
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));

        let frame = manager.read().unwrap();
        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(manager.handle().map(|h| h.index), Some(0));
    }

    #[test]
    fn test_release_on_drop() {
        let devices = ScriptedDevices::new().device(0, Auto, [], Read::Frame(640, 480));
        let journal = devices.journal.clone();
        {
            let mut manager =
                AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));
            manager.acquire().unwrap();
            assert_eq!(journal.borrow().releases, 1); // probe source only
        }
        assert_eq!(journal.borrow().releases, 2);
    }

    #[test]
    fn test_release_marks_handle_closed() {
        let devices = ScriptedDevices::new().device(0, Auto, [], Read::Frame(640, 480));
        let mut manager = AcquisitionManager::new(Box::new(devices), fast_config(vec![Auto]));
        manager.acquire().unwrap();

        manager.release();
        manager.release();
        assert_eq!(manager.handle().map(|h| h.status), Some(HandleStatus::Closed));
    }
}
