//! Worker error taxonomy.
//!
//! Every session failure is classified by kind and by the pipeline stage it
//! happened in; the stage feeds the `error.stage` log field and the kind
//! decides the lifecycle policy (fail the session, abandon the lease, or
//! surface to the loop).

use thiserror::Error;

use super::aggregate::AggregationError;
use super::canonical::CanonicalizationError;

/// Pipeline stage names carried on failure logs and session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStage {
    Ocr,
    Layout,
    Diff,
    Db,
    Lifecycle,
}

impl WorkerStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Layout => "layout",
            Self::Diff => "diff",
            Self::Db => "db",
            Self::Lifecycle => "lifecycle",
        }
    }
}

/// Classified failure of one worker operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// Connection resets, lock conflicts, and other retryable database trouble.
    #[error("transient database failure during {}: {message}", .stage.as_str())]
    TransientDb { stage: WorkerStage, message: String },

    /// An ownership guard matched zero rows; the lease belongs to someone else.
    #[error("session lease lost: {message}")]
    LeaseLost { message: String },

    /// Invalid time or date while building the canonical day.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Merge invariants were violated during aggregation.
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    /// The database or pipeline output broke the shared schema contract.
    #[error("schema contract violated during {}: {message}", .stage.as_str())]
    SchemaContract { stage: WorkerStage, message: String },

    /// An external collaborator (OCR, layout, object storage) failed.
    #[error("{} stage failed: {message}", .stage.as_str())]
    External { stage: WorkerStage, message: String },

    /// Anything else; the loop keeps running.
    #[error("unexpected worker failure: {message}")]
    Unexpected { message: String },
}

impl WorkerError {
    pub fn transient_db(stage: WorkerStage, message: impl Into<String>) -> Self {
        Self::TransientDb {
            stage,
            message: message.into(),
        }
    }

    pub fn lease_lost(message: impl Into<String>) -> Self {
        Self::LeaseLost {
            message: message.into(),
        }
    }

    pub fn schema_contract(stage: WorkerStage, message: impl Into<String>) -> Self {
        Self::SchemaContract {
            stage,
            message: message.into(),
        }
    }

    pub fn external(stage: WorkerStage, message: impl Into<String>) -> Self {
        Self::External {
            stage,
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Stage reported in `error.stage`.
    pub fn stage(&self) -> WorkerStage {
        match self {
            Self::TransientDb { stage, .. }
            | Self::SchemaContract { stage, .. }
            | Self::External { stage, .. } => *stage,
            Self::LeaseLost { .. } => WorkerStage::Lifecycle,
            // Canonicalization and aggregation failures surface from the
            // layout/normalization half of the pipeline.
            Self::Canonicalization(_) | Self::Aggregation(_) => WorkerStage::Layout,
            Self::Unexpected { .. } => WorkerStage::Lifecycle,
        }
    }

    /// Stable kind name reported in `error.type`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::TransientDb { .. } => "TransientDB",
            Self::LeaseLost { .. } => "LeaseLost",
            Self::Canonicalization(_) => "Canonicalization",
            Self::Aggregation(_) => "Aggregation",
            Self::SchemaContract { .. } => "SchemaContract",
            Self::External { .. } => "External",
            Self::Unexpected { .. } => "Unexpected",
        }
    }
}

/// Cap stored failure text so a pathological OCR dump cannot bloat the row.
pub fn truncate_error_text(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_owned();
    }
    let kept: String = message.chars().take(limit.saturating_sub(3)).collect();
    format!("{kept}...")
}
