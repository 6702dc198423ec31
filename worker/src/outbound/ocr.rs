//! OCR adapter for pre-rendered box dumps.
//!
//! The capture pipeline runs the actual OCR engine upstream and stores its
//! output as a JSON array of text boxes next to each screenshot, so this
//! worker stays free of native inference dependencies. A live engine
//! implements the same port in its own adapter.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::layout::TextBox;
use crate::domain::ports::{OcrEngine, OcrEngineError};

/// OCR engine decoding pre-rendered box dumps from the fetched bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrerenderedOcrEngine;

#[derive(Debug, Deserialize)]
struct BoxRecord {
    text: String,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    #[serde(default = "full_confidence")]
    confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

#[async_trait]
impl OcrEngine for PrerenderedOcrEngine {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<TextBox>, OcrEngineError> {
        let records: Vec<BoxRecord> = serde_json::from_slice(image).map_err(|err| {
            OcrEngineError::recognition(format!("box dump is not valid JSON: {err}"))
        })?;
        Ok(records
            .into_iter()
            .map(|record| TextBox {
                text: record.text,
                x: record.x,
                y: record.y,
                w: record.w,
                h: record.h,
                confidence: record.confidence,
            })
            .collect())
    }
}
