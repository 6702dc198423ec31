//! Outbound adapters: persistence, object storage, and OCR.

pub mod object_store;
pub mod ocr;
pub mod persistence;
