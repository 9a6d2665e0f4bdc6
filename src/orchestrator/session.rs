//! On-disk session persistence.
//!
//! The workflow state survives between CLI invocations as
//! `.spriteforge/session.json` plus one file per reference image under
//! `.spriteforge/refs/`. `is_generating` is never persisted.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::asset::{AssetId, ImageData};
use crate::lineage::LineageTree;
use crate::phase::Phase;
use crate::workflow::{ReferenceSlot, WorkflowState};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_parent: Option<AssetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompt_draft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    /// File names under `refs/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_upload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dna_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_base: Option<String>,
    updated_at: DateTime<Utc>,
}

pub struct SessionStore {
    session_file: PathBuf,
    refs_dir: PathBuf,
}

impl SessionStore {
    pub fn new(session_file: PathBuf, refs_dir: PathBuf) -> Self {
        Self {
            session_file,
            refs_dir,
        }
    }

    pub fn exists(&self) -> bool {
        self.session_file.exists()
    }

    /// Persist `state`. Reference files for empty slots are removed.
    pub fn save(&self, state: &WorkflowState) -> Result<()> {
        fs::create_dir_all(&self.refs_dir).context("Failed to create refs directory")?;

        let mut names = [None, None, None];
        for (slot, name) in ReferenceSlot::ALL.iter().zip(names.iter_mut()) {
            self.remove_slot_files(*slot)?;
            if let Some(image) = state.reference(*slot) {
                let file_name = format!("{}.{}", slot.as_str(), image.extension());
                fs::write(self.refs_dir.join(&file_name), image.bytes())
                    .with_context(|| format!("Failed to write reference {}", file_name))?;
                *name = Some(file_name);
            }
        }
        let [raw_upload, dna_base, identity_base] = names;

        let file = SessionFile {
            phase: state.phase,
            active_parent: state.active_parent.as_ref().map(|p| p.id),
            prompt_draft: state.prompt_draft.clone(),
            last_error: state.last_error.clone(),
            raw_upload,
            dna_base,
            identity_base,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize session")?;
        fs::write(&self.session_file, json).context("Failed to write session file")?;
        debug!(phase = %state.phase, "session saved");
        Ok(())
    }

    /// Load the persisted state, resolving the active parent through `lineage`.
    /// Returns `None` when no session was saved yet.
    pub fn load(&self, lineage: &LineageTree) -> Result<Option<WorkflowState>> {
        if !self.session_file.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&self.session_file).context("Failed to read session file")?;
        let file: SessionFile =
            serde_json::from_str(&content).context("Failed to parse session file")?;

        let active_parent = match file.active_parent {
            Some(id) => match lineage.get(&id) {
                Some(asset) => Some(asset.clone()),
                None => {
                    warn!(id = %id, "active parent is no longer in the vault; dropping it");
                    None
                }
            },
            None => None,
        };

        let state = WorkflowState {
            phase: file.phase,
            raw_upload: self.read_ref(file.raw_upload.as_deref())?,
            dna_base: self.read_ref(file.dna_base.as_deref())?,
            identity_base: self.read_ref(file.identity_base.as_deref())?,
            active_parent,
            prompt_draft: file.prompt_draft,
            is_generating: false,
            last_error: file.last_error,
        };
        state
            .validate()
            .context("Session file is inconsistent; run `spriteforge reset --force`")?;
        Ok(Some(state))
    }

    /// Remove the session file and all reference images.
    pub fn clear(&self) -> Result<()> {
        if self.session_file.exists() {
            fs::remove_file(&self.session_file).context("Failed to remove session file")?;
        }
        if self.refs_dir.exists() {
            fs::remove_dir_all(&self.refs_dir).context("Failed to remove refs directory")?;
        }
        Ok(())
    }

    fn read_ref(&self, name: Option<&str>) -> Result<Option<ImageData>> {
        let Some(name) = name else {
            return Ok(None);
        };
        let path = self.refs_dir.join(name);
        let image = ImageData::from_path(&path)
            .with_context(|| format!("Failed to read reference image {}", path.display()))?;
        Ok(Some(image))
    }

    fn remove_slot_files(&self, slot: ReferenceSlot) -> Result<()> {
        let prefix = format!("{}.", slot.as_str());
        for entry in fs::read_dir(&self.refs_dir).context("Failed to list refs directory")? {
            let path = entry?.path();
            if file_name_starts_with(&path, &prefix) {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

fn file_name_starts_with(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AspectRatio, GeneratedAsset};
    use crate::workflow::WorkflowEvent;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("session.json"), dir.path().join("refs"))
    }

    fn gear_state() -> WorkflowState {
        WorkflowState::new()
            .apply(WorkflowEvent::Upload(ImageData::new("image/jpeg", vec![1])))
            .and_then(|s| s.apply(WorkflowEvent::BaseExtracted(ImageData::png(vec![2]))))
            .and_then(|s| s.apply(WorkflowEvent::IdentityRefined(ImageData::png(vec![3]))))
            .unwrap()
    }

    #[test]
    fn test_missing_session_loads_none() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load(&LineageTree::new()).unwrap().is_none());
    }

    #[test]
    fn test_round_trip_with_active_parent() {
        let dir = TempDir::new().unwrap();
        let asset = GeneratedAsset::derive(ImageData::png(vec![4]), None, "vest", "m", AspectRatio::Square);
        let lineage = LineageTree::from_assets([asset.clone()]);
        let state = gear_state()
            .apply(WorkflowEvent::AssetSelected(asset.clone()))
            .and_then(|s| s.apply(WorkflowEvent::ErrorRaised("boom".into())))
            .unwrap();

        let sessions = store(&dir);
        sessions.save(&state).unwrap();
        let loaded = sessions.load(&lineage).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.raw_upload.unwrap().mime_type(), "image/jpeg");
    }

    #[test]
    fn test_generating_flag_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let state = gear_state().apply(WorkflowEvent::GenerationStarted).unwrap();
        let sessions = store(&dir);
        sessions.save(&state).unwrap();
        let loaded = sessions.load(&LineageTree::new()).unwrap().unwrap();
        assert!(!loaded.is_generating);
    }

    #[test]
    fn test_missing_active_parent_is_dropped() {
        let dir = TempDir::new().unwrap();
        let asset = GeneratedAsset::derive(ImageData::png(vec![4]), None, "vest", "m", AspectRatio::Square);
        let state = gear_state()
            .apply(WorkflowEvent::GearSynthesized(asset))
            .unwrap();
        let sessions = store(&dir);
        sessions.save(&state).unwrap();
        let loaded = sessions.load(&LineageTree::new()).unwrap().unwrap();
        assert!(loaded.active_parent.is_none());
        assert_eq!(loaded.phase, Phase::Gear);
    }

    #[test]
    fn test_reset_state_removes_reference_files() {
        let dir = TempDir::new().unwrap();
        let sessions = store(&dir);
        sessions.save(&gear_state()).unwrap();
        assert_eq!(fs::read_dir(dir.path().join("refs")).unwrap().count(), 3);

        let reset = gear_state().apply(WorkflowEvent::Reset).unwrap();
        sessions.save(&reset).unwrap();
        assert_eq!(fs::read_dir(dir.path().join("refs")).unwrap().count(), 0);
        let loaded = sessions.load(&LineageTree::new()).unwrap().unwrap();
        assert_eq!(loaded.phase, Phase::Intake);
    }

    #[test]
    fn test_inconsistent_session_is_rejected() {
        let dir = TempDir::new().unwrap();
        let sessions = store(&dir);
        sessions.save(&gear_state()).unwrap();
        let content = fs::read_to_string(dir.path().join("session.json")).unwrap();
        fs::write(
            dir.path().join("session.json"),
            content.replace("\"GEAR\"", "\"INTAKE\""),
        )
        .unwrap();
        assert!(sessions.load(&LineageTree::new()).is_err());
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let sessions = store(&dir);
        sessions.save(&gear_state()).unwrap();
        sessions.clear().unwrap();
        assert!(!sessions.exists());
        assert!(!dir.path().join("refs").exists());
    }
}
