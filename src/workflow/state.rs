use serde::{Deserialize, Serialize};

use crate::asset::{AssetId, GeneratedAsset, ImageData};
use crate::errors::WorkflowError;
use crate::phase::{Phase, Stage};

/// The three canonical reference images of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSlot {
    RawUpload,
    DnaBase,
    IdentityBase,
}

impl ReferenceSlot {
    pub const ALL: [ReferenceSlot; 3] = [Self::RawUpload, Self::DnaBase, Self::IdentityBase];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawUpload => "raw_upload",
            Self::DnaBase => "dna_base",
            Self::IdentityBase => "identity_base",
        }
    }
}

impl std::fmt::Display for ReferenceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can happen to a workflow.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// User image received (INTAKE → EXTRACTION)
    Upload(ImageData),
    /// Base-body extraction succeeded (EXTRACTION → IDENTITY)
    BaseExtracted(ImageData),
    /// Identity refinement succeeded (IDENTITY → GEAR)
    IdentityRefined(ImageData),
    /// Gear synthesis succeeded (GEAR → GEAR)
    GearSynthesized(GeneratedAsset),
    /// An existing asset was picked as the next base (any → GEAR)
    AssetSelected(GeneratedAsset),
    /// An asset left the lineage
    AssetRemoved(AssetId),
    GenerationStarted,
    GenerationFinished,
    ErrorRaised(String),
    ErrorCleared,
    /// Full reset back to INTAKE
    Reset,
}

/// The single mutable aggregate of a session.
///
/// Invariants:
/// - `dna_base` set ⇒ phase ∈ {IDENTITY, GEAR}
/// - `identity_base` set ⇒ phase == GEAR
/// - phase == INTAKE ⇒ no reference image is set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub phase: Phase,
    pub raw_upload: Option<ImageData>,
    pub dna_base: Option<ImageData>,
    pub identity_base: Option<ImageData>,
    pub active_parent: Option<GeneratedAsset>,
    /// Prompt text pre-loaded by selecting an asset
    pub prompt_draft: Option<String>,
    /// Mutual-exclusion flag for the single outstanding synthesis call
    pub is_generating: bool,
    pub last_error: Option<String>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure transition function. On error `self` is untouched and no partial
    /// state exists.
    pub fn apply(&self, event: WorkflowEvent) -> Result<WorkflowState, WorkflowError> {
        let mut next = self.clone();
        match event {
            WorkflowEvent::Upload(image) => {
                self.expect_phase(Phase::Intake, "upload")?;
                if image.is_empty() {
                    return Err(WorkflowError::EmptyImage);
                }
                next.raw_upload = Some(image);
                next.phase = Phase::Extraction;
            }
            WorkflowEvent::BaseExtracted(image) => {
                self.require_stage(Stage::Extraction)?;
                if image.is_empty() {
                    return Err(WorkflowError::EmptyImage);
                }
                next.dna_base = Some(image);
                next.phase = Phase::Identity;
            }
            WorkflowEvent::IdentityRefined(image) => {
                self.require_stage(Stage::Identity)?;
                if image.is_empty() {
                    return Err(WorkflowError::EmptyImage);
                }
                next.identity_base = Some(image);
                next.phase = Phase::Gear;
            }
            WorkflowEvent::GearSynthesized(asset) => {
                self.require_stage(Stage::Gear)?;
                next.active_parent = Some(asset);
            }
            WorkflowEvent::AssetSelected(asset) => {
                if self.is_generating {
                    return Err(WorkflowError::AlreadyGenerating);
                }
                // Gear always composes on the identity base
                if self.identity_base.is_none() {
                    return Err(WorkflowError::MissingReference(ReferenceSlot::IdentityBase));
                }
                next.prompt_draft = Some(asset.prompt.clone());
                next.active_parent = Some(asset);
                next.phase = Phase::Gear;
            }
            WorkflowEvent::AssetRemoved(id) => {
                if self.is_generating {
                    return Err(WorkflowError::AlreadyGenerating);
                }
                if next.active_parent.as_ref().is_some_and(|p| p.id == id) {
                    next.active_parent = None;
                }
            }
            WorkflowEvent::GenerationStarted => {
                if self.is_generating {
                    return Err(WorkflowError::AlreadyGenerating);
                }
                next.is_generating = true;
            }
            WorkflowEvent::GenerationFinished => {
                next.is_generating = false;
            }
            WorkflowEvent::ErrorRaised(message) => {
                next.last_error = Some(message);
            }
            WorkflowEvent::ErrorCleared => {
                next.last_error = None;
            }
            WorkflowEvent::Reset => {
                next.raw_upload = None;
                next.dna_base = None;
                next.identity_base = None;
                next.active_parent = None;
                next.prompt_draft = None;
                next.phase = Phase::Intake;
            }
        }
        Ok(next)
    }

    /// Check that `stage` may run now: right phase, required reference present.
    pub fn require_stage(&self, stage: Stage) -> Result<(), WorkflowError> {
        self.expect_phase(stage.phase(), stage.operation())?;
        let (slot, image) = match stage {
            Stage::Extraction => (ReferenceSlot::RawUpload, &self.raw_upload),
            Stage::Identity => (ReferenceSlot::DnaBase, &self.dna_base),
            Stage::Gear => (ReferenceSlot::IdentityBase, &self.identity_base),
        };
        if image.is_none() {
            return Err(WorkflowError::MissingReference(slot));
        }
        Ok(())
    }

    fn expect_phase(&self, phase: Phase, operation: &'static str) -> Result<(), WorkflowError> {
        if self.phase != phase {
            return Err(WorkflowError::WrongPhase {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    pub fn reference(&self, slot: ReferenceSlot) -> Option<&ImageData> {
        match slot {
            ReferenceSlot::RawUpload => self.raw_upload.as_ref(),
            ReferenceSlot::DnaBase => self.dna_base.as_ref(),
            ReferenceSlot::IdentityBase => self.identity_base.as_ref(),
        }
    }

    /// Image an export would use: active asset, then identity base, then base body.
    pub fn current_reference(&self) -> Option<&ImageData> {
        self.active_parent
            .as_ref()
            .map(|p| &p.image)
            .or(self.identity_base.as_ref())
            .or(self.dna_base.as_ref())
    }

    /// Verify the aggregate invariants, e.g. for a state restored from disk.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.dna_base.is_some() && !matches!(self.phase, Phase::Identity | Phase::Gear) {
            return Err(WorkflowError::InvalidSession(format!(
                "dna_base is set but phase is {}",
                self.phase
            )));
        }
        if self.identity_base.is_some() && self.phase != Phase::Gear {
            return Err(WorkflowError::InvalidSession(format!(
                "identity_base is set but phase is {}",
                self.phase
            )));
        }
        if self.phase == Phase::Intake && self.raw_upload.is_some() {
            return Err(WorkflowError::InvalidSession(
                "raw_upload is set but phase is INTAKE".to_string(),
            ));
        }
        Ok(())
    }
}
