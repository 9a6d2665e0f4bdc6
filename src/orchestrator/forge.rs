use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::asset::{AssetId, GeneratedAsset, ImageData};
use crate::errors::{ForgeError, PixelError, SynthesisError, WorkflowError};
use crate::export::ExportArtifact;
use crate::lineage::LineageTree;
use crate::phase::{Phase, Stage};
use crate::pixel::{ChromaKeyExtractor, ChromaKeySettings, DriftReport, SilhouetteDriftValidator};
use crate::storage::AssetStore;
use crate::synthesis::{SynthesisRequest, SynthesisSettings, Synthesizer};
use crate::workflow::{ReferenceSlot, WorkflowEvent, WorkflowState};

struct Inner {
    state: WorkflowState,
    lineage: LineageTree,
    /// Assets generated but rejected by the vault
    unsaved: HashSet<AssetId>,
    /// Bumped on every reset; in-flight results from an older epoch are discarded
    epoch: u64,
}

/// What a stage call captured when it started.
struct StageSnapshot {
    references: Vec<ImageData>,
    parent: Option<GeneratedAsset>,
    epoch: u64,
}

/// Coordinates the workflow state, the lineage and both external
/// collaborators into the three stage operations.
///
/// At most one synthesis call is outstanding at any time. A second call made
/// while one is in flight is rejected with `AlreadyGenerating`, never queued.
/// The state lock is never held across an `.await`.
///
/// Every failure is also written to `WorkflowState::last_error`.
pub struct ForgeOrchestrator {
    inner: Mutex<Inner>,
    synthesizer: Arc<dyn Synthesizer>,
    store: Arc<dyn AssetStore>,
    settings: SynthesisSettings,
    chroma: ChromaKeySettings,
}

/// Clears `is_generating` when dropped, whichever way the stage call ends.
struct GenerationGuard<'a> {
    forge: &'a ForgeOrchestrator,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.forge.inner.lock() {
            if let Ok(next) = inner.state.apply(WorkflowEvent::GenerationFinished) {
                inner.state = next;
            }
        }
    }
}

impl ForgeOrchestrator {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        store: Arc<dyn AssetStore>,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: WorkflowState::new(),
                lineage: LineageTree::new(),
                unsaved: HashSet::new(),
                epoch: 0,
            }),
            synthesizer,
            store,
            settings,
            chroma: ChromaKeySettings::default(),
        }
    }

    pub fn with_chroma(mut self, chroma: ChromaKeySettings) -> Self {
        self.chroma = chroma;
        self
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ForgeError> {
        self.inner.lock().map_err(|_| ForgeError::LockPoisoned)
    }

    /// Write `err` to `last_error` (overwriting) and hand it back.
    /// Must not be called while the state lock is held.
    fn record(&self, err: ForgeError) -> ForgeError {
        warn!(error = %err, "operation failed");
        if let Ok(mut inner) = self.inner.lock() {
            if let Ok(next) = inner.state.apply(WorkflowEvent::ErrorRaised(err.to_string())) {
                inner.state = next;
            }
        }
        err
    }

    /// Apply one event under the lock.
    fn transition(&self, event: WorkflowEvent) -> Result<(), ForgeError> {
        let mut inner = self.lock()?;
        inner.state = inner.state.apply(event)?;
        Ok(())
    }

    // ---- session ----

    /// Load every stored asset into the lineage. Called once before any user action.
    pub async fn bootstrap(&self) -> Result<usize, ForgeError> {
        let assets = match self.store.load_all().await {
            Ok(assets) => assets,
            Err(e) => return Err(self.record(e.into())),
        };
        let mut inner = self.lock()?;
        inner.lineage = LineageTree::from_assets(assets);
        let count = inner.lineage.len();
        info!(assets = count, "vault loaded");
        Ok(count)
    }

    /// Install a previously persisted workflow state. Rejected while a
    /// synthesis call is in flight or when the state breaks an invariant.
    pub fn restore(&self, state: WorkflowState) -> Result<(), ForgeError> {
        self.install(state).map_err(|e| self.record(e))
    }

    fn install(&self, state: WorkflowState) -> Result<(), ForgeError> {
        let mut inner = self.lock()?;
        if inner.state.is_generating {
            return Err(WorkflowError::AlreadyGenerating.into());
        }
        state.validate()?;
        inner.state = WorkflowState {
            is_generating: false,
            ..state
        };
        Ok(())
    }

    pub fn snapshot(&self) -> Result<WorkflowState, ForgeError> {
        Ok(self.lock()?.state.clone())
    }

    pub fn phase(&self) -> Result<Phase, ForgeError> {
        Ok(self.lock()?.state.phase)
    }

    /// Read access to the lineage.
    pub fn with_lineage<R>(&self, f: impl FnOnce(&LineageTree) -> R) -> Result<R, ForgeError> {
        let inner = self.lock()?;
        Ok(f(&inner.lineage))
    }

    /// Assets that exist in memory but failed to persist, in lineage order.
    pub fn unsaved_assets(&self) -> Result<Vec<AssetId>, ForgeError> {
        let inner = self.lock()?;
        Ok(inner
            .lineage
            .iter()
            .map(|a| a.id)
            .filter(|id| inner.unsaved.contains(id))
            .collect())
    }

    pub fn clear_error(&self) -> Result<(), ForgeError> {
        self.transition(WorkflowEvent::ErrorCleared)
    }

    // ---- workflow ----

    /// INTAKE → EXTRACTION.
    pub fn upload(&self, image: ImageData) -> Result<(), ForgeError> {
        debug!(bytes = image.len(), mime = image.mime_type(), "upload");
        self.transition(WorkflowEvent::Upload(image))
            .map_err(|e| self.record(e))
    }

    /// Select an existing asset as the next gear base. Jumps to GEAR and
    /// pre-loads the asset's prompt.
    pub fn select_asset(&self, id: &AssetId) -> Result<GeneratedAsset, ForgeError> {
        self.select(id).map_err(|e| self.record(e))
    }

    fn select(&self, id: &AssetId) -> Result<GeneratedAsset, ForgeError> {
        let mut inner = self.lock()?;
        let asset = inner
            .lineage
            .get(id)
            .cloned()
            .ok_or(WorkflowError::AssetNotFound(*id))?;
        inner.state = inner
            .state
            .apply(WorkflowEvent::AssetSelected(asset.clone()))?;
        debug!(id = %id, step = asset.evolution_step, "asset selected");
        Ok(asset)
    }

    /// Full reset to INTAKE. A result still in flight will be discarded.
    pub fn reset(&self) -> Result<(), ForgeError> {
        let mut inner = self.lock()?;
        inner.state = inner.state.apply(WorkflowEvent::Reset)?;
        inner.epoch += 1;
        if inner.state.is_generating {
            warn!("reset while a synthesis call is in flight; its result will be discarded");
        }
        info!("workflow reset");
        Ok(())
    }

    /// Remove an asset from the vault, then from the lineage. Children keep
    /// their dangling `parent_id`.
    pub async fn delete_asset(&self, id: &AssetId) -> Result<GeneratedAsset, ForgeError> {
        self.check_deletable(id).map_err(|e| self.record(e))?;
        if let Err(e) = self.store.delete(id).await {
            return Err(self.record(e.into()));
        }
        let removed = self.forget(id).map_err(|e| self.record(e))?;
        info!(id = %id, "asset deleted");
        Ok(removed)
    }

    /// Rejected while a synthesis call is in flight, before the vault is touched.
    fn check_deletable(&self, id: &AssetId) -> Result<(), ForgeError> {
        let inner = self.lock()?;
        if inner.state.is_generating {
            return Err(WorkflowError::AlreadyGenerating.into());
        }
        if !inner.lineage.contains(id) {
            return Err(WorkflowError::AssetNotFound(*id).into());
        }
        Ok(())
    }

    fn forget(&self, id: &AssetId) -> Result<GeneratedAsset, ForgeError> {
        let mut inner = self.lock()?;
        let removed = inner
            .lineage
            .remove(id)
            .ok_or(WorkflowError::AssetNotFound(*id))?;
        inner.unsaved.remove(id);
        inner.state = inner.state.apply(WorkflowEvent::AssetRemoved(*id))?;
        Ok(removed)
    }

    /// Persist an asset whose earlier save failed.
    pub async fn retry_save(&self, id: &AssetId) -> Result<(), ForgeError> {
        let asset = match self.with_lineage(|tree| tree.get(id).cloned())? {
            Some(asset) => asset,
            None => return Err(self.record(WorkflowError::AssetNotFound(*id).into())),
        };
        if let Err(source) = self.store.save(&asset).await {
            return Err(self.record(ForgeError::Unsaved {
                asset_id: *id,
                source,
            }));
        }
        self.lock()?.unsaved.remove(id);
        info!(id = %id, "asset saved on retry");
        Ok(())
    }

    // ---- stages ----

    /// Check single-flight, phase, references and prompt (in that order),
    /// then mark the call as generating. Nothing changes when this fails.
    fn begin(
        &self,
        stage: Stage,
        prompt: &str,
        source: Option<ImageData>,
    ) -> Result<StageSnapshot, ForgeError> {
        let mut inner = self.lock()?;
        let started = inner.state.apply(WorkflowEvent::GenerationStarted)?;
        inner.state.require_stage(stage)?;

        let state = &inner.state;
        let (references, parent) = match stage {
            Stage::Extraction => {
                let source = match source {
                    Some(image) if image.is_empty() => {
                        return Err(WorkflowError::EmptyImage.into());
                    }
                    Some(image) => image,
                    None => state
                        .raw_upload
                        .clone()
                        .ok_or(WorkflowError::MissingReference(ReferenceSlot::RawUpload))?,
                };
                (vec![source], None)
            }
            Stage::Identity => {
                let base = state
                    .dna_base
                    .clone()
                    .ok_or(WorkflowError::MissingReference(ReferenceSlot::DnaBase))?;
                (vec![base], None)
            }
            Stage::Gear => {
                let base = state
                    .identity_base
                    .clone()
                    .ok_or(WorkflowError::MissingReference(ReferenceSlot::IdentityBase))?;
                let parent = state.active_parent.clone();
                let mut refs = vec![base];
                if let Some(p) = &parent {
                    refs.push(p.image.clone());
                }
                (refs, parent)
            }
        };
        if stage != Stage::Extraction && prompt.trim().is_empty() {
            return Err(WorkflowError::EmptyPrompt.into());
        }

        inner.state = started;
        Ok(StageSnapshot {
            references,
            parent,
            epoch: inner.epoch,
        })
    }

    async fn call_synthesizer(
        &self,
        stage: Stage,
        prompt: &str,
        snapshot: &StageSnapshot,
    ) -> Result<ImageData, ForgeError> {
        let instructions = self
            .settings
            .instructions(stage, prompt, snapshot.parent.is_some());
        let request = SynthesisRequest::new(
            stage,
            snapshot.references.clone(),
            instructions,
            self.settings.params(),
        )?;
        info!(
            stage = %stage,
            model = %self.settings.model,
            references = request.references.len(),
            "{}",
            stage.label()
        );
        let image = self.synthesizer.synthesize(&request).await?;
        if image.is_empty() {
            return Err(SynthesisError::EmptyResult.into());
        }
        Ok(image)
    }

    /// Apply a stage result, unless a reset happened since the call started.
    fn commit<T>(
        &self,
        snapshot: &StageSnapshot,
        f: impl FnOnce(&mut Inner) -> Result<T, ForgeError>,
    ) -> Result<T, ForgeError> {
        let result = {
            let mut inner = self.lock()?;
            if inner.epoch != snapshot.epoch {
                Err(WorkflowError::Superseded.into())
            } else {
                f(&mut *inner)
            }
        };
        result.map_err(|e| self.record(e))
    }

    /// EXTRACTION → IDENTITY. A blank prompt falls back to the default
    /// design. `source` replaces the raw upload (e.g. a locally edited variant).
    pub async fn extract_base(
        &self,
        prompt: &str,
        source: Option<ImageData>,
    ) -> Result<ImageData, ForgeError> {
        let snapshot = self
            .begin(Stage::Extraction, prompt, source)
            .map_err(|e| self.record(e))?;
        let _guard = GenerationGuard { forge: self };

        let image = self
            .call_synthesizer(Stage::Extraction, prompt, &snapshot)
            .await
            .map_err(|e| self.record(e))?;

        self.commit(&snapshot, |inner| {
            inner.state = inner
                .state
                .apply(WorkflowEvent::BaseExtracted(image.clone()))?;
            Ok(())
        })?;
        info!(bytes = image.len(), "base body extracted");
        Ok(image)
    }

    /// IDENTITY → GEAR. The prompt (face and hair traits) is required.
    pub async fn refine_identity(&self, prompt: &str) -> Result<ImageData, ForgeError> {
        let snapshot = self
            .begin(Stage::Identity, prompt, None)
            .map_err(|e| self.record(e))?;
        let _guard = GenerationGuard { forge: self };

        let image = self
            .call_synthesizer(Stage::Identity, prompt, &snapshot)
            .await
            .map_err(|e| self.record(e))?;

        self.commit(&snapshot, |inner| {
            inner.state = inner
                .state
                .apply(WorkflowEvent::IdentityRefined(image.clone()))?;
            Ok(())
        })?;
        info!(bytes = image.len(), "identity locked");
        Ok(image)
    }

    /// GEAR → GEAR. Appends a new asset to the lineage, makes it the active
    /// parent and persists it.
    ///
    /// If the vault rejects the asset it stays in memory and in the lineage;
    /// the error is `ForgeError::Unsaved` and `retry_save` can persist it later.
    pub async fn synthesize_gear(&self, prompt: &str) -> Result<GeneratedAsset, ForgeError> {
        let snapshot = self
            .begin(Stage::Gear, prompt, None)
            .map_err(|e| self.record(e))?;
        let _guard = GenerationGuard { forge: self };

        let image = self
            .call_synthesizer(Stage::Gear, prompt, &snapshot)
            .await
            .map_err(|e| self.record(e))?;

        let asset = self.commit(&snapshot, |inner| {
            // Parent comes from the snapshot taken at call start, not the
            // current selection.
            let asset = GeneratedAsset::derive(
                image,
                snapshot.parent.as_ref(),
                prompt.trim(),
                self.settings.model.clone(),
                self.settings.aspect_ratio,
            );
            debug_assert_eq!(asset.parent_id, snapshot.parent.as_ref().map(|p| p.id));
            inner.state = inner
                .state
                .apply(WorkflowEvent::GearSynthesized(asset.clone()))?;
            inner.lineage.insert(asset.clone());
            Ok(asset)
        })?;
        info!(
            id = %asset.id,
            step = asset.evolution_step,
            parent = ?asset.parent_id,
            "gear synthesized"
        );

        if let Err(source) = self.store.save(&asset).await {
            if let Ok(mut inner) = self.inner.lock() {
                inner.unsaved.insert(asset.id);
            }
            return Err(self.record(ForgeError::Unsaved {
                asset_id: asset.id,
                source,
            }));
        }
        Ok(asset)
    }

    // ---- pixel work ----

    /// Produce the export artifact for the current reference (active asset,
    /// else identity base, else base body), optionally with the background
    /// keyed out.
    pub async fn export(&self, transparent: bool) -> Result<ExportArtifact, ForgeError> {
        let (phase, image) = {
            let inner = self.lock()?;
            (inner.state.phase, inner.state.current_reference().cloned())
        };
        let Some(image) = image else {
            return Err(self.record(WorkflowError::NothingToExport.into()));
        };
        let image = if transparent {
            let extractor =
                ChromaKeyExtractor::new(self.chroma).map_err(|e| self.record(e.into()))?;
            run_blocking(move || extractor.extract(&image))
                .await
                .map_err(|e| self.record(e.into()))?
        } else {
            image
        };
        Ok(ExportArtifact::new(phase, image, transparent, Utc::now()))
    }

    /// Advisory silhouette drift of an asset against the identity base
    /// (or the base body when no identity base is set).
    pub async fn check_drift(&self, id: &AssetId) -> Result<DriftReport, ForgeError> {
        let (base, candidate) = self.drift_inputs(id).map_err(|e| self.record(e))?;
        let report = run_blocking(move || SilhouetteDriftValidator::new().check(&base, &candidate))
            .await
            .map_err(|e| self.record(e.into()))?;
        debug!(id = %id, percent = report.percent, "drift checked");
        Ok(report)
    }

    fn drift_inputs(&self, id: &AssetId) -> Result<(ImageData, ImageData), ForgeError> {
        let inner = self.lock()?;
        let base = inner
            .state
            .identity_base
            .clone()
            .or_else(|| inner.state.dna_base.clone())
            .ok_or(WorkflowError::MissingReference(ReferenceSlot::IdentityBase))?;
        let candidate = inner
            .lineage
            .get(id)
            .map(|a| a.image.clone())
            .ok_or(WorkflowError::AssetNotFound(*id))?;
        Ok((base, candidate))
    }
}

/// Run CPU-bound pixel work off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, PixelError>
where
    F: FnOnce() -> Result<T, PixelError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PixelError::Task(e.to_string()))?
}
