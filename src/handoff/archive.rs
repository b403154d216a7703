//! Per-scan text archive
//!
//! Keeps one human-readable file per finalized scan with the fields and the
//! raw OCR text, for auditing misreads after the fact.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{HandOff, ScanRecord};

/// Writes `id_scan_<timestamp>.txt` files into a directory
#[derive(Debug, Clone)]
pub struct ScanArchive {
    dir: PathBuf,
}

impl ScanArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a record is archived under. Two scans in the same second get
    /// distinct names through the record id.
    pub fn path_for(&self, record: &ScanRecord) -> PathBuf {
        let stamp = record.scanned_at.format("%Y%m%d_%H%M%S");
        let candidate = self.dir.join(format!("id_scan_{}.txt", stamp));
        if candidate.exists() {
            let short = record.id.simple().to_string();
            self.dir
                .join(format!("id_scan_{}_{}.txt", stamp, &short[..8]))
        } else {
            candidate
        }
    }

    /// Render the archive entry
    pub fn render(record: &ScanRecord) -> String {
        let mut lines = vec![
            format!("Scan Date: {}", record.scanned_at.format("%Y-%m-%d %H:%M:%S")),
            format!("Scan ID: {}", record.id),
            format!("STUDENT NO: {}", record.student_no),
            format!("NAME: {}", record.name),
        ];
        if let Some(course) = &record.course {
            lines.push(format!("COURSE: {}", course));
        }
        if let Some(year) = &record.year_level {
            lines.push(format!("YEAR: {}", year));
        }
        lines.push(String::new());
        lines.push("Raw OCR Text:".to_string());
        lines.push(record.raw_text.clone());

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

impl HandOff for ScanArchive {
    fn name(&self) -> &str {
        "archive"
    }

    fn publish(&mut self, record: &ScanRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create archive directory {:?}", self.dir))?;

        let path = self.path_for(record);
        std::fs::write(&path, Self::render(record))
            .with_context(|| format!("Failed to write {:?}", path))?;

        info!("Text data saved to {:?}", path);
        Ok(())
    }
}
