//! Text extraction from screenshots.

use crate::classifier::preprocess::encode_png;
use crate::platform::process::run_with_timeout;
use image::DynamicImage;
use std::io::Write;
use std::process::Command;
use std::time::Duration;

const TESSERACT_TIMEOUT: Duration = Duration::from_secs(30);

/// Best-effort OCR.
pub trait TextExtractor {
    fn extract_text(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Errors from OCR.
#[derive(Debug)]
pub enum OcrError {
    Encode(String),
    Io(String),
    Engine(String),
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::Encode(e) => write!(f, "OCR encode error: {e}"),
            OcrError::Io(e) => write!(f, "OCR IO error: {e}"),
            OcrError::Engine(e) => write!(f, "OCR engine error: {e}"),
        }
    }
}

impl std::error::Error for OcrError {}

/// OCR through the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self {
            binary: "tesseract".to_string(),
            timeout: TESSERACT_TIMEOUT,
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::new()
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for TesseractOcr {
    fn extract_text(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let png = encode_png(image).map_err(|e| OcrError::Encode(e.to_string()))?;

        let mut file = tempfile::Builder::new()
            .prefix("ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Io(e.to_string()))?;
        file.write_all(&png).map_err(|e| OcrError::Io(e.to_string()))?;
        file.flush().map_err(|e| OcrError::Io(e.to_string()))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(file.path()).arg("stdout");
        let output =
            run_with_timeout(cmd, self.timeout).map_err(|e| OcrError::Engine(e.to_string()))?;
        if !output.status.success() {
            return Err(OcrError::Engine(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Extractor that never finds text.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOcr;

impl TextExtractor for NoOcr {
    fn extract_text(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        Ok(String::new())
    }
}
