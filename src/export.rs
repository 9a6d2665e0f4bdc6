//! Export artifacts and their naming.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::asset::ImageData;
use crate::phase::Phase;

pub const PRODUCT_NAME: &str = "spriteforge";

/// A downloadable image plus the file name it should be written under.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub image: ImageData,
    /// Whether the image went through background removal
    pub transparent: bool,
}

impl ExportArtifact {
    pub fn new(phase: Phase, image: ImageData, transparent: bool, at: DateTime<Utc>) -> Self {
        Self {
            file_name: export_file_name(phase, at, image.extension()),
            image,
            transparent,
        }
    }

    /// Write into `dir`, creating it if needed. Returns the written path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, self.image.bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// `{product}-{PHASE}-{unix millis}.{ext}`
pub fn export_file_name(phase: Phase, at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}-{}-{}.{}",
        PRODUCT_NAME,
        phase.as_str(),
        at.timestamp_millis(),
        extension
    )
}
