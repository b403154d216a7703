//! Detection state machine
//!
//! Gates OCR passes to one per scan interval, accumulates fields across
//! passes, drops a stale partial record and reports completion exactly once
//! per card. Time is always passed in so the machine never reads the clock.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::extraction::FieldRecord;

/// Timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionConfig {
    /// Minimum time between OCR passes
    pub scan_interval: Duration,
    /// A partial record older than this is discarded
    pub detection_timeout: Duration,
    /// How long `Scanning` / `Complete` stay visible after a pass
    pub scanning_display: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
            detection_timeout: Duration::from_secs(3),
            scanning_display: Duration::from_millis(500),
        }
    }
}

/// What a display collaborator should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    /// Waiting for a card
    Looking,
    /// An OCR pass just ran
    Scanning,
    /// A complete record was just handed off
    Complete,
}

impl std::fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionStatus::Looking => write!(f, "LOOKING FOR ID"),
            DetectionStatus::Scanning => write!(f, "SCANNING..."),
            DetectionStatus::Complete => write!(f, "SCAN COMPLETE"),
        }
    }
}

/// Pass timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionTimers {
    pub last_scan_time: Option<Instant>,
    pub last_detection_time: Option<Instant>,
}

/// Result of feeding one OCR pass to the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Neither the student number nor the name was found
    Empty,
    /// Some fields found; the record is still incomplete
    Partial,
    /// Both required fields are known. The record has been taken out of the
    /// machine, which starts over empty.
    Complete(FieldRecord),
}

/// Per-card accumulation and timing
#[derive(Debug, Clone)]
pub struct DetectionStateMachine {
    config: DetectionConfig,
    record: FieldRecord,
    timers: DetectionTimers,
    completed_at: Option<Instant>,
}

impl DetectionStateMachine {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            record: FieldRecord::default(),
            timers: DetectionTimers::default(),
            completed_at: None,
        }
    }

    /// Fields accumulated so far for the current card
    pub fn record(&self) -> &FieldRecord {
        &self.record
    }

    #[cfg(test)]
    pub fn timers(&self) -> DetectionTimers {
        self.timers
    }

    /// Discard a partial record whose last detection is older than the
    /// timeout. Returns whether a reset happened.
    pub fn check_staleness(&mut self, now: Instant) -> bool {
        if !self.record.has_identifier() {
            return false;
        }
        let Some(last) = self.timers.last_detection_time else {
            return false;
        };

        if now.saturating_duration_since(last) > self.config.detection_timeout {
            info!(
                "Detection timed out, discarding partial record {:?}",
                self.record
            );
            self.record.clear();
            true
        } else {
            false
        }
    }

    /// Whether an OCR pass is due
    pub fn should_scan(&self, now: Instant) -> bool {
        match self.timers.last_scan_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.config.scan_interval,
        }
    }

    /// Feed the fields extracted by an OCR pass made at `now`
    pub fn apply_pass(&mut self, now: Instant, extracted: &FieldRecord) -> PassOutcome {
        self.timers.last_scan_time = Some(now);

        if !extracted.has_identifier() {
            debug!("OCR pass found no identifying fields");
            return PassOutcome::Empty;
        }

        self.timers.last_detection_time = Some(now);
        if self.record.merge(extracted) {
            debug!("Record updated: {:?}", self.record);
        }

        if self.record.is_complete() {
            let record = std::mem::take(&mut self.record);
            self.completed_at = Some(now);
            info!(
                "Scan complete: student_no={:?} name={:?}",
                record.student_no(),
                record.name()
            );
            PassOutcome::Complete(record)
        } else {
            PassOutcome::Partial
        }
    }

    /// Operator reset: forget the current card
    pub fn reset(&mut self) {
        info!("Detection reset");
        self.record.clear();
        self.timers.last_detection_time = None;
        self.completed_at = None;
    }

    pub fn status(&self, now: Instant) -> DetectionStatus {
        let within = |at: Option<Instant>| {
            at.map(|at| now.saturating_duration_since(at) < self.config.scanning_display)
                .unwrap_or(false)
        };

        if within(self.completed_at) {
            DetectionStatus::Complete
        } else if within(self.timers.last_scan_time) {
            DetectionStatus::Scanning
        } else {
            DetectionStatus::Looking
        }
    }
}

impl Default for DetectionStateMachine {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}
