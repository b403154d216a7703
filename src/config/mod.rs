//! Application Configuration
//!
//! Kiosk settings stored in TOML format. Every section has defaults so a
//! partial file (or none at all) is valid. Durations are stored in
//! milliseconds and converted to the runtime configs of each component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{AcquisitionConfig, CaptureBackend};
use crate::control::ControlKeys;
use crate::detection::DetectionConfig;
use crate::extraction::{ExtractionConfig, DEFAULT_EXCLUDED_LABELS};
use crate::handoff::{AfterHandOff, SinkKind};
use crate::scanner::ScannerConfig;
use crate::vision::{ScanAreaCalculator, ScanProfile, ScanTier, TesseractConfig};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera acquisition settings
    pub camera: CameraSettings,
    /// Scan-area geometry
    pub scan_area: ScanAreaSettings,
    /// Scan timing
    pub detection: DetectionSettings,
    /// Field extraction heuristics
    pub extraction: ExtractionSettings,
    /// OCR engine
    pub ocr: OcrSettings,
    /// Hand-off sinks
    pub handoff: HandoffSettings,
    /// Operator controls
    pub controls: ControlSettings,
}

impl AppConfig {
    /// Loop policy drawn from the camera and hand-off sections
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            max_consecutive_failures: self.camera.max_consecutive_failures,
            failure_pause: Duration::from_millis(self.camera.failure_pause_ms),
            after_handoff: self.handoff.after_handoff,
        }
    }
}

/// Camera-related settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device indices `0..probe_count` are probed
    pub probe_count: u32,
    /// Backend used for the responsiveness probe
    pub probe_backend: CaptureBackend,
    pub probe_delay_ms: u64,
    /// Backends in priority order
    pub backends: Vec<CaptureBackend>,
    pub backend_switch_delay_ms: u64,
    /// Request `width` x `height` once a camera is accepted
    pub apply_resolution: bool,
    pub width: u32,
    pub height: u32,
    pub read_retries: u32,
    pub retry_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Consecutive failed ticks before the scanner stops
    pub max_consecutive_failures: u32,
    pub failure_pause_ms: u64,
    /// Directory of still images played back by the `replay` backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_dir: Option<PathBuf>,
    pub replay_frame_interval_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            probe_count: 5,
            probe_backend: CaptureBackend::Auto,
            probe_delay_ms: 100,
            backends: CaptureBackend::default_priority(),
            backend_switch_delay_ms: 200,
            apply_resolution: true,
            width: 1280,
            height: 720,
            read_retries: 3,
            retry_delay_ms: 100,
            reconnect_delay_ms: 1000,
            max_consecutive_failures: 10,
            failure_pause_ms: 1000,
            replay_dir: None,
            replay_frame_interval_ms: 200,
        }
    }
}

impl CameraSettings {
    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            probe_count: self.probe_count,
            probe_backend: self.probe_backend,
            probe_delay: Duration::from_millis(self.probe_delay_ms),
            backends: self.backends.clone(),
            backend_switch_delay: Duration::from_millis(self.backend_switch_delay_ms),
            target_resolution: self.apply_resolution.then_some((self.width, self.height)),
            read_retries: self.read_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    /// Route probing and acquisition through the replay backend
    pub fn use_replay(&mut self, dir: PathBuf) {
        self.replay_dir = Some(dir);
        self.probe_backend = CaptureBackend::Replay;
        self.backends = vec![CaptureBackend::Replay];
        self.probe_count = self.probe_count.max(1);
    }
}

/// Scan-area settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanAreaSettings {
    /// Built-in geometry
    pub profile: ScanProfile,
    /// Overrides the profile's aspect ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    /// Overrides the profile's resolution tiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<ScanTier>>,
}

impl ScanAreaSettings {
    pub fn calculator(&self) -> ScanAreaCalculator {
        ScanAreaCalculator::new(
            self.aspect_ratio.unwrap_or_else(|| self.profile.aspect_ratio()),
            self.tiers.clone().unwrap_or_else(|| self.profile.tiers()),
        )
    }
}

/// Scan timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum time between OCR passes
    pub scan_interval_ms: u64,
    /// Partial records older than this are discarded
    pub detection_timeout_ms: u64,
    /// How long the scanning state stays visible
    pub scanning_display_ms: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: 5000,
            detection_timeout_ms: 3000,
            scanning_display_ms: 500,
        }
    }
}

impl DetectionSettings {
    pub fn detection_config(&self) -> DetectionConfig {
        DetectionConfig {
            scan_interval: Duration::from_millis(self.scan_interval_ms),
            detection_timeout: Duration::from_millis(self.detection_timeout_ms),
            scanning_display: Duration::from_millis(self.scanning_display_ms),
        }
    }
}

/// Field extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Card labels never accepted as a name
    pub excluded_labels: Vec<String>,
    /// Lines inspected after a bare `NAME` label
    pub name_lookahead: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            excluded_labels: DEFAULT_EXCLUDED_LABELS.iter().map(|s| s.to_string()).collect(),
            name_lookahead: 3,
        }
    }
}

impl ExtractionSettings {
    pub fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            excluded_labels: self.excluded_labels.clone(),
            name_lookahead: self.name_lookahead,
        }
    }
}

/// OCR engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// tesseract executable name or path
    pub binary: String,
    /// Language pack(s)
    pub language: String,
    /// Page segmentation mode
    pub psm: u32,
    pub timeout_ms: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        let defaults = TesseractConfig::default();
        Self {
            binary: defaults.binary,
            language: defaults.language,
            psm: defaults.psm,
            timeout_ms: defaults.timeout.as_millis() as u64,
        }
    }
}

impl OcrSettings {
    pub fn tesseract_config(&self) -> TesseractConfig {
        TesseractConfig {
            binary: self.binary.clone(),
            language: self.language.clone(),
            psm: self.psm,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Hand-off settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSettings {
    /// Enabled sinks
    pub sinks: Vec<SinkKind>,
    /// File read by the confirmation screen
    pub temp_file: PathBuf,
    /// Keep one text file per scan in `archive_dir`
    pub archive: bool,
    pub archive_dir: PathBuf,
    pub after_handoff: AfterHandOff,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            sinks: vec![SinkKind::Log, SinkKind::TempFile],
            temp_file: PathBuf::from("temp_scan_data.txt"),
            archive: true,
            archive_dir: PathBuf::from("id_text_output"),
            after_handoff: AfterHandOff::Continue,
        }
    }
}

/// Operator control settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Key (followed by Enter) that stops the scanner
    pub abort_key: String,
    /// Key (followed by Enter) that clears the current card
    pub reset_key: String,
    /// Read commands from the terminal
    pub terminal: bool,
    /// Treat Ctrl-C as abort
    pub ctrl_c: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            abort_key: "q".to_string(),
            reset_key: "r".to_string(),
            terminal: true,
            ctrl_c: true,
        }
    }
}

impl ControlSettings {
    pub fn keys(&self) -> Result<ControlKeys> {
        ControlKeys::new(&self.abort_key, &self.reset_key)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("Invalid config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
