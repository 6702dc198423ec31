//! Port for the external OCR engine.
//!
//! The engine is a pure function from image bytes to text boxes; it performs
//! no filtering or grouping of its own. Layout interpretation belongs to the
//! domain layout parser.

use async_trait::async_trait;

use crate::domain::layout::TextBox;

use super::define_port_error;

define_port_error! {
    /// Errors raised by OCR engine adapters.
    pub enum OcrEngineError {
        /// The engine could not process the image.
        Recognition { message: String } =>
            "ocr recognition failed: {message}",
    }
}

/// Port producing raw text boxes from screenshot bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<TextBox>, OcrEngineError>;
}

/// Fixture implementation that sees no text.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureOcrEngine;

#[async_trait]
impl OcrEngine for FixtureOcrEngine {
    async fn recognize(&self, _image: &[u8]) -> Result<Vec<TextBox>, OcrEngineError> {
        Ok(Vec::new())
    }
}
