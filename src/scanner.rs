//! Scanner Coordinator
//!
//! Owns every pipeline component and runs the single-threaded pull loop:
//! read a frame, watch for stale partial records, run an OCR pass when one is
//! due and hand complete records off.

use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::capture::{AcquisitionManager, CaptureError, Frame};
use crate::control::{ControlCommand, ControlListener};
use crate::detection::{DetectionStateMachine, DetectionStatus, PassOutcome};
use crate::extraction::FieldExtractor;
use crate::handoff::{AfterHandOff, HandOff, ScanRecord};
use crate::vision::{ScanArea, VisionPipeline};

/// Loop policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Consecutive failed ticks before giving up on the camera
    pub max_consecutive_failures: u32,
    /// Pause after a failed tick
    pub failure_pause: Duration,
    pub after_handoff: AfterHandOff,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 10,
            failure_pause: Duration::from_secs(1),
            after_handoff: AfterHandOff::Continue,
        }
    }
}

/// Why the loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum ScannerExit {
    /// Operator abort or Ctrl-C
    Aborted,
    /// A record was handed off and `after_handoff` is `exit`
    HandedOff(ScanRecord),
    /// Too many consecutive frame read failures
    CameraLost { failures: u32 },
}

/// Result of one loop iteration
#[derive(Debug)]
pub enum Tick {
    /// Frame read, no OCR pass due
    Idle,
    /// OCR pass ran without completing a record
    Scanned,
    /// A complete record was published
    HandedOff(ScanRecord),
    /// No frame could be read
    ReadFailed(CaptureError),
}

/// The kiosk scanner
pub struct Scanner {
    camera: AcquisitionManager,
    vision: VisionPipeline,
    extractor: FieldExtractor,
    detection: DetectionStateMachine,
    sinks: Vec<Box<dyn HandOff>>,
    controls: ControlListener,
    config: ScannerConfig,
    last_status: DetectionStatus,
    last_area: Option<ScanArea>,
}

impl Scanner {
    pub fn new(
        camera: AcquisitionManager,
        vision: VisionPipeline,
        extractor: FieldExtractor,
        detection: DetectionStateMachine,
        controls: ControlListener,
        config: ScannerConfig,
    ) -> Self {
        Self {
            camera,
            vision,
            extractor,
            detection,
            sinks: Vec::new(),
            controls,
            config,
            last_status: DetectionStatus::Looking,
            last_area: None,
        }
    }

    /// Add a hand-off sink; records are published to sinks in insertion order
    pub fn add_sink(&mut self, sink: Box<dyn HandOff>) {
        info!("Hand-off sink enabled: {}", sink.name());
        self.sinks.push(sink);
    }

    #[cfg(test)]
    pub fn detection(&self) -> &DetectionStateMachine {
        &self.detection
    }

    /// Acquire the camera and scan until aborted, handed off (when
    /// configured to exit) or the camera is lost. The camera is released on
    /// every path.
    pub fn run(&mut self) -> Result<ScannerExit, CaptureError> {
        self.camera.acquire()?;
        info!("Scanner running");

        let mut failures = 0u32;
        let exit = loop {
            if let Some(command) = self.controls.poll() {
                match command {
                    ControlCommand::Abort => {
                        info!("Abort requested");
                        break ScannerExit::Aborted;
                    }
                    ControlCommand::Reset => self.detection.reset(),
                }
            }

            match self.tick(Instant::now()) {
                Tick::ReadFailed(e) => {
                    failures += 1;
                    warn!(
                        "Failed to read frame ({}/{}): {}",
                        failures, self.config.max_consecutive_failures, e
                    );
                    if failures >= self.config.max_consecutive_failures {
                        error!("Too many consecutive failures, stopping scanner");
                        break ScannerExit::CameraLost { failures };
                    }
                    if !self.config.failure_pause.is_zero() {
                        std::thread::sleep(self.config.failure_pause);
                    }
                }
                Tick::HandedOff(record) => {
                    failures = 0;
                    if self.config.after_handoff == AfterHandOff::Exit {
                        break ScannerExit::HandedOff(record);
                    }
                }
                Tick::Idle | Tick::Scanned => failures = 0,
            }
        };

        self.camera.release();
        info!("Scanner stopped: {:?}", exit);
        Ok(exit)
    }

    /// One loop iteration at `now`
    pub fn tick(&mut self, now: Instant) -> Tick {
        self.detection.check_staleness(now);

        let frame = match self.camera.read() {
            Ok(frame) => frame,
            Err(e) => return Tick::ReadFailed(e),
        };

        let area = self.vision.scan_area(frame.width(), frame.height());
        if self.last_area != Some(area) {
            info!(
                "Scan area {}x{} at ({}, {}) for {}x{} frames",
                area.width,
                area.height,
                area.x,
                area.y,
                frame.width(),
                frame.height()
            );
            self.last_area = Some(area);
        }

        let tick = if self.detection.should_scan(now) {
            self.scan(now, &frame)
        } else {
            Tick::Idle
        };

        self.log_status(now);
        tick
    }

    fn scan(&mut self, now: Instant, frame: &Frame) -> Tick {
        let text = match self.vision.process(frame) {
            Ok(result) => {
                debug!(
                    "OCR pass over {}x{} took {} ms",
                    result.area.width, result.area.height, result.processing_time_ms
                );
                result.text
            }
            Err(e) => {
                warn!("OCR failed: {}", e);
                String::new()
            }
        };

        let fields = self.extractor.extract(&text);
        if fields.is_empty() {
            debug!("No card fields in OCR text");
        }
        match self.detection.apply_pass(now, &fields) {
            PassOutcome::Complete(fields) => match ScanRecord::from_fields(&fields, &text) {
                Some(record) => {
                    self.publish(&record);
                    Tick::HandedOff(record)
                }
                None => Tick::Scanned,
            },
            PassOutcome::Partial => {
                debug!(fields = ?self.detection.record(), "Partial card read");
                Tick::Scanned
            }
            PassOutcome::Empty => Tick::Scanned,
        }
    }

    fn publish(&mut self, record: &ScanRecord) {
        info!(
            "Handing off scan {} (student_no={}, name={})",
            record.id, record.student_no, record.name
        );
        for sink in &mut self.sinks {
            if let Err(e) = sink.publish(record) {
                error!("Hand-off via {} failed: {:#}", sink.name(), e);
            }
        }
    }

    fn log_status(&mut self, now: Instant) {
        let status = self.detection.status(now);
        if status != self.last_status {
            info!("Status: {}", status);
            self.last_status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{Journal, Read, ScriptedDevices};
    use crate::capture::{AcquisitionConfig, CaptureBackend};
    use crate::detection::DetectionConfig;
    use crate::handoff::ChannelHandOff;
    use crate::vision::{OcrEngine, OcrError, Preprocessor, ScanAreaCalculator};
    use crossbeam_channel::{Receiver, Sender};
    use image::GrayImage;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Returns scripted texts in order, then empty text
    struct ScriptedOcr {
        replies: VecDeque<Result<String, OcrError>>,
        calls: Rc<RefCell<u32>>,
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize(&mut self, _image: &GrayImage) -> Result<String, OcrError> {
            *self.calls.borrow_mut() += 1;
            self.replies.pop_front().unwrap_or_else(|| Ok(String::new()))
        }
    }

    struct Harness {
        scanner: Scanner,
        journal: Rc<RefCell<Journal>>,
        ocr_calls: Rc<RefCell<u32>>,
        records: Receiver<ScanRecord>,
        commands: Sender<ControlCommand>,
    }

    fn quick_acquisition() -> AcquisitionConfig {
        AcquisitionConfig {
            probe_count: 1,
            probe_backend: CaptureBackend::Auto,
            probe_delay: Duration::ZERO,
            backends: vec![CaptureBackend::Auto],
            backend_switch_delay: Duration::ZERO,
            target_resolution: None,
            read_retries: 3,
            retry_delay: Duration::ZERO,
            reconnect_delay: Duration::ZERO,
        }
    }

    fn harness(
        devices: ScriptedDevices,
        replies: Vec<Result<String, OcrError>>,
        detection: DetectionConfig,
        config: ScannerConfig,
    ) -> Harness {
        let journal = devices.journal.clone();
        let ocr_calls = Rc::new(RefCell::new(0));
        let camera = AcquisitionManager::new(Box::new(devices), quick_acquisition());
        let vision = VisionPipeline::new(
            ScanAreaCalculator::default(),
            Preprocessor::default(),
            Box::new(ScriptedOcr {
                replies: replies.into(),
                calls: ocr_calls.clone(),
            }),
        );

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (record_tx, record_rx) = crossbeam_channel::unbounded();
        let mut scanner = Scanner::new(
            camera,
            vision,
            FieldExtractor::default(),
            DetectionStateMachine::new(detection),
            ControlListener::from_receiver(command_rx),
            config,
        );
        scanner.add_sink(Box::new(ChannelHandOff::new(record_tx)));

        Harness {
            scanner,
            journal,
            ocr_calls,
            records: record_rx,
            commands: command_tx,
        }
    }

    fn working_camera() -> ScriptedDevices {
        ScriptedDevices::new().device(0, CaptureBackend::Auto, [], Read::Frame(64, 48))
    }

    fn every_tick() -> DetectionConfig {
        DetectionConfig {
            scan_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn exit_after_handoff() -> ScannerConfig {
        ScannerConfig {
            failure_pause: Duration::ZERO,
            after_handoff: AfterHandOff::Exit,
            ..Default::default()
        }
    }

    const CARD: &str = "STUDENT NO 1284-21\nNAME\nJUAN DELA CRUZ";

    #[test]
    fn test_run_hands_off_and_exits() {
        let mut h = harness(
            working_camera(),
            vec![Ok("LYCEUM".to_string()), Ok(CARD.to_string())],
            every_tick(),
            exit_after_handoff(),
        );

        let record = match h.scanner.run().unwrap() {
            ScannerExit::HandedOff(record) => record,
            other => panic!("expected hand-off, got {:?}", other),
        };
        assert_eq!(record.student_no, "1284-21");
        assert_eq!(record.name, "JUAN DELA CRUZ");
        assert_eq!(record.raw_text, CARD);

        assert_eq!(h.records.try_recv().unwrap(), record);
        assert!(h.records.try_recv().is_err());
        assert_eq!(*h.ocr_calls.borrow(), 2);

        // Probe source and the accepted source are both released
        let journal = h.journal.borrow();
        assert_eq!(journal.releases as usize, journal.opens.len());
    }

    #[test]
    fn test_abort_stops_before_scanning() {
        let mut h = harness(working_camera(), vec![], every_tick(), exit_after_handoff());
        h.commands.send(ControlCommand::Abort).unwrap();

        assert_eq!(h.scanner.run().unwrap(), ScannerExit::Aborted);
        assert_eq!(*h.ocr_calls.borrow(), 0);
        let journal = h.journal.borrow();
        assert_eq!(journal.releases as usize, journal.opens.len());
    }

    #[test]
    fn test_no_device_is_fatal() {
        let mut h = harness(ScriptedDevices::new(), vec![], every_tick(), exit_after_handoff());
        assert!(matches!(
            h.scanner.run(),
            Err(CaptureError::NoDeviceFound { .. })
        ));
    }

    #[test]
    fn test_camera_lost_after_consecutive_failures() {
        // Probe and acquisition succeed, every later read fails
        let devices = ScriptedDevices::new().device(
            0,
            CaptureBackend::Auto,
            [Read::Frame(64, 48), Read::Frame(64, 48)],
            Read::Error,
        );
        let mut h = harness(devices, vec![], every_tick(), exit_after_handoff());

        assert_eq!(
            h.scanner.run().unwrap(),
            ScannerExit::CameraLost { failures: 10 }
        );
        assert_eq!(*h.ocr_calls.borrow(), 0);
        let journal = h.journal.borrow();
        assert_eq!(journal.releases as usize, journal.opens.len());
    }

    #[test]
    fn test_good_frame_resets_failure_count() {
        // From an open camera, the first failed tick consumes three retries
        // plus the reconnect probe; each later one only the probe. A
        // recovering tick consumes the probe, the acquisition and the read.
        fn failing_ticks(count: usize) -> Vec<Read> {
            vec![Read::Error; 3 + count]
        }
        let recovery = [Read::Frame(64, 48); 3];

        let mut reads = vec![Read::Frame(64, 48), Read::Frame(64, 48)];
        reads.extend(failing_ticks(6));
        reads.extend(recovery);
        reads.extend(failing_ticks(6));
        reads.extend(recovery);

        let devices =
            ScriptedDevices::new().device(0, CaptureBackend::Auto, reads, Read::Frame(64, 48));
        let mut h = harness(
            devices,
            vec![Ok(String::new()), Ok(String::new()), Ok(CARD.to_string())],
            every_tick(),
            exit_after_handoff(),
        );

        // 12 failed ticks in total, never 10 in a row
        let exit = h.scanner.run().unwrap();
        assert!(matches!(exit, ScannerExit::HandedOff(_)), "{:?}", exit);
        assert_eq!(*h.ocr_calls.borrow(), 3);
        let journal = h.journal.borrow();
        assert_eq!(journal.releases as usize, journal.opens.len());
    }

    #[test]
    fn test_ocr_failure_counts_as_empty_pass() {
        let mut h = harness(
            working_camera(),
            vec![Err(OcrError::Timeout(Duration::from_secs(10)))],
            every_tick(),
            exit_after_handoff(),
        );
        h.scanner.camera.acquire().unwrap();

        let now = Instant::now();
        assert!(matches!(h.scanner.tick(now), Tick::Scanned));
        assert_eq!(h.scanner.detection().timers().last_scan_time, Some(now));
        assert!(h.scanner.detection().record().is_empty());
    }

    #[test]
    fn test_tick_respects_scan_interval() {
        let mut h = harness(
            working_camera(),
            vec![Ok("1284-21".to_string())],
            DetectionConfig::default(),
            exit_after_handoff(),
        );
        h.scanner.camera.acquire().unwrap();

        let t0 = Instant::now();
        assert!(matches!(h.scanner.tick(t0), Tick::Scanned));
        assert!(matches!(h.scanner.tick(t0 + Duration::from_secs(1)), Tick::Idle));
        assert_eq!(*h.ocr_calls.borrow(), 1);
        assert_eq!(h.scanner.detection().record().student_no(), Some("1284-21"));

        // The partial record goes stale before the next pass is due
        assert!(matches!(h.scanner.tick(t0 + Duration::from_secs(4)), Tick::Idle));
        assert!(h.scanner.detection().record().is_empty());
    }

    #[test]
    fn test_continue_after_handoff_keeps_scanning() {
        let mut h = harness(
            working_camera(),
            vec![Ok(CARD.to_string()), Ok(CARD.to_string())],
            every_tick(),
            ScannerConfig {
                failure_pause: Duration::ZERO,
                after_handoff: AfterHandOff::Continue,
                ..Default::default()
            },
        );
        h.scanner.camera.acquire().unwrap();

        let t0 = Instant::now();
        assert!(matches!(h.scanner.tick(t0), Tick::HandedOff(_)));
        assert!(matches!(
            h.scanner.tick(t0 + Duration::from_millis(10)),
            Tick::HandedOff(_)
        ));
        assert_eq!(h.records.len(), 2);
    }
}
