//! OCR (Optical Character Recognition) adapter
//!
//! The scanner only needs `binary image -> text`. The shipped engine drives the
//! `tesseract` command-line tool, feeding a PNG on stdin and reading plain text
//! from stdout, under an explicit timeout so a hung engine cannot stall the
//! scan loop.

use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Errors raised by an OCR engine. Never fatal to the scan loop.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine process could not be started
    #[error("failed to start OCR engine (is it installed?): {0}")]
    Spawn(#[source] std::io::Error),

    /// The engine did not answer in time and was killed
    #[error("OCR engine timed out after {0:?}")]
    Timeout(Duration),

    /// The engine exited with an error
    #[error("OCR engine failed ({status}): {stderr}")]
    Engine { status: String, stderr: String },

    /// The image could not be encoded for the engine
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    /// I/O error talking to the engine
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text recognition on a black-text-on-white binary image
pub trait OcrEngine {
    /// Best-effort multi-line transcription of `image`
    fn recognize(&mut self, image: &GrayImage) -> Result<String, OcrError>;
}

/// Tesseract invocation settings
#[derive(Debug, Clone, PartialEq)]
pub struct TesseractConfig {
    /// Executable name or path
    pub binary: String,
    /// Language pack(s), e.g. "eng" or "eng+fil"
    pub language: String,
    /// Page segmentation mode (6 = a single uniform block of text)
    pub psm: u32,
    /// Upper bound on one recognition call
    pub timeout: Duration,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            psm: 6,
            timeout: Duration::from_secs(10),
        }
    }
}

impl TesseractConfig {
    /// Command-line arguments: read the image from stdin, write text to stdout
    pub fn args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            self.psm.to_string(),
        ]
    }
}

/// OCR through the tesseract CLI
pub struct TesseractOcr {
    config: TesseractConfig,
    runtime: tokio::runtime::Runtime,
}

impl TesseractOcr {
    /// Create the engine and its private single-threaded runtime
    pub fn new(config: TesseractConfig) -> Result<Self, OcrError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { config, runtime })
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&mut self, image: &GrayImage) -> Result<String, OcrError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(String::new());
        }

        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let timeout = self.config.timeout;
        let config = &self.config;
        let text = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, run_tesseract(config, png)).await })
            .map_err(|_| OcrError::Timeout(timeout))??;

        debug!("OCR returned {} bytes", text.len());
        Ok(text)
    }
}

async fn run_tesseract(config: &TesseractConfig, png: Vec<u8>) -> Result<String, OcrError> {
    let mut child = Command::new(&config.binary)
        .args(config.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(OcrError::Spawn)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&png).await?;
        // Closing stdin tells tesseract the image is complete
        drop(stdin);
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OcrError::Engine {
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
