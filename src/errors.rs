//! Typed error hierarchy for SpriteForge.
//!
//! Four leaf enums cover the four failure families:
//! - `WorkflowError`: precondition violations, rejected before any external call
//! - `SynthesisError`: the synthesis collaborator failed or returned nothing usable
//! - `StorageError`: the asset vault could not read or write
//! - `PixelError`: decoding, encoding or parameter failures in pixel processing
//!
//! `ForgeError` is what every orchestrator operation returns.

use thiserror::Error;

use crate::asset::AssetId;
use crate::phase::Phase;
use crate::workflow::ReferenceSlot;

/// Precondition violations. Local and never retryable.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("'{operation}' is not allowed in phase {phase}")]
    WrongPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("Missing required reference image: {0}")]
    MissingReference(ReferenceSlot),

    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Image is empty")]
    EmptyImage,

    #[error("A synthesis call is already in progress")]
    AlreadyGenerating,

    #[error("Asset {0} not found")]
    AssetNotFound(AssetId),

    #[error("Workflow was reset while the synthesis call was in flight; result discarded")]
    Superseded,

    #[error("Invalid session state: {0}")]
    InvalidSession(String),

    #[error("Nothing to export: no active asset, identity base or base body")]
    NothingToExport,
}

/// Failures reported by, or while talking to, the synthesis collaborator.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Synthesis service reported: {0}")]
    Service(String),

    #[error("Synthesis returned no image")]
    EmptyResult,

    #[error("Expected 1 or 2 reference images, got {0}")]
    ReferenceCount(usize),

    #[error("Failed to launch synthesis command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Invalid synthesis response: {0}")]
    InvalidResponse(String),
}

/// Failures from the asset vault.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Corrupt asset row {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures in local pixel processing. Never affect the workflow phase.
#[derive(Debug, Error)]
pub enum PixelError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid pixel parameters: {0}")]
    InvalidParameters(String),

    #[error("Pixel task failed: {0}")]
    Task(String),
}

/// Error returned by every `ForgeOrchestrator` operation.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error(transparent)]
    Precondition(#[from] WorkflowError),

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// The asset was generated and is usable in memory, but the vault rejected it.
    #[error("Asset {asset_id} was generated but could not be saved: {source}")]
    Unsaved {
        asset_id: AssetId,
        #[source]
        source: StorageError,
    },

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Image processing failed: {0}")]
    Pixel(#[from] PixelError),

    #[error("Workflow state lock poisoned")]
    LockPoisoned,
}

impl ForgeError {
    /// Whether re-invoking the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Synthesis(_) | Self::Unsaved { .. })
    }

    /// Whether the operation was rejected before any external call.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_phase_carries_operation_and_phase() {
        let err = WorkflowError::WrongPhase {
            operation: "refine",
            phase: Phase::Intake,
        };
        let msg = err.to_string();
        assert!(msg.contains("refine"));
        assert!(msg.contains("INTAKE"));
    }

    #[test]
    fn test_precondition_is_not_retryable() {
        let err: ForgeError = WorkflowError::EmptyPrompt.into();
        assert!(err.is_precondition());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_synthesis_failure_is_retryable() {
        let err: ForgeError = SynthesisError::Service("quota exceeded".into()).into();
        assert!(err.is_retryable());
        assert!(!err.is_precondition());
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_unsaved_is_retryable_and_distinct_from_storage() {
        let id = AssetId::new();
        let err = ForgeError::Unsaved {
            asset_id: id,
            source: StorageError::LockPoisoned,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains(&id.to_string()));

        let plain: ForgeError = StorageError::LockPoisoned.into();
        assert!(!plain.is_retryable());
        assert!(matches!(plain, ForgeError::Storage(_)));
    }

    #[test]
    fn test_all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkflowError::AlreadyGenerating);
        assert_std_error(&SynthesisError::EmptyResult);
        assert_std_error(&StorageError::LockPoisoned);
        assert_std_error(&PixelError::InvalidParameters("x".into()));
        assert_std_error(&ForgeError::LockPoisoned);
    }
}
