//! Hand-off of finalized scans
//!
//! A completed card becomes a [`ScanRecord`] that is published to every
//! configured sink. Sinks are independent; a failing sink is logged by the
//! caller and never stops the scanner.

pub mod archive;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use crate::extraction::FieldRecord;

pub use archive::ScanArchive;

/// Finalized scan handed to the confirmation step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    /// Unique scan identifier
    pub id: Uuid,
    pub student_no: String,
    pub name: String,
    pub course: Option<String>,
    pub year_level: Option<String>,
    /// Local time of completion
    pub scanned_at: DateTime<Local>,
    /// Text of the OCR pass that completed the record
    pub raw_text: String,
}

impl ScanRecord {
    /// Build a record from complete fields; `None` if a required field is missing
    pub fn from_fields(fields: &FieldRecord, raw_text: &str) -> Option<Self> {
        Self::from_fields_at(fields, raw_text, Local::now())
    }

    pub fn from_fields_at(
        fields: &FieldRecord,
        raw_text: &str,
        scanned_at: DateTime<Local>,
    ) -> Option<Self> {
        Some(Self {
            id: Uuid::new_v4(),
            student_no: fields.student_no()?.to_string(),
            name: fields.name()?.to_string(),
            course: fields.course().map(str::to_string),
            year_level: fields.year_level().map(str::to_string),
            scanned_at,
            raw_text: raw_text.to_string(),
        })
    }
}

/// Publication boundary to the confirmation step
pub trait HandOff {
    /// Short sink name for logs
    fn name(&self) -> &str;

    fn publish(&mut self, record: &ScanRecord) -> Result<()>;
}

/// Hand-off sink kinds selectable from config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Structured log event
    Log,
    /// Two-line file read by the confirmation screen
    TempFile,
    /// Summary printed on the kiosk terminal
    Console,
}

/// What the scanner does after a successful hand-off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterHandOff {
    /// Keep scanning for the next card
    #[default]
    Continue,
    /// Stop the scanner and release the camera
    Exit,
}

/// Emits the record as a JSON log line
#[derive(Debug, Default)]
pub struct LogHandOff;

impl HandOff for LogHandOff {
    fn name(&self) -> &str {
        "log"
    }

    fn publish(&mut self, record: &ScanRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize scan record")?;
        info!(scan = %json, "Scan handed off");
        Ok(())
    }
}

/// Writes `student_no\nname\n` for the confirmation screen
#[derive(Debug, Clone)]
pub struct TempFileHandOff {
    path: PathBuf,
}

impl TempFileHandOff {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HandOff for TempFileHandOff {
    fn name(&self) -> &str {
        "temp_file"
    }

    fn publish(&mut self, record: &ScanRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = format!("{}\n{}\n", record.student_no, record.name);
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {:?}", self.path))?;

        info!("Scan data saved to {:?}", self.path);
        Ok(())
    }
}

/// Forwards records to an in-process consumer such as the console printer
#[derive(Debug, Clone)]
pub struct ChannelHandOff {
    sender: Sender<ScanRecord>,
}

impl ChannelHandOff {
    pub fn new(sender: Sender<ScanRecord>) -> Self {
        Self { sender }
    }
}

impl HandOff for ChannelHandOff {
    fn name(&self) -> &str {
        "channel"
    }

    fn publish(&mut self, record: &ScanRecord) -> Result<()> {
        self.sender
            .send(record.clone())
            .map_err(|_| anyhow::anyhow!("Scan record receiver disconnected"))
    }
}
