//! `spriteforge init`: create the `.spriteforge/` directory in a project.
//!
//! ```text
//! .spriteforge/
//! ├── forge.toml       # Project configuration (written with defaults)
//! ├── vault.db         # Asset vault (created on first use)
//! ├── session.json     # Current workflow state (created on first use)
//! ├── refs/            # Reference images of the current session
//! └── logs/
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::forge_config::ForgeToml;

/// The name of the spriteforge project directory.
pub const FORGE_DIR: &str = ".spriteforge";

/// Result of initializing a project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the `.spriteforge` directory
    pub forge_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
    /// Whether a default `forge.toml` was written
    pub wrote_config: bool,
}

/// Initialize a project in `project_dir`.
///
/// Safe to run again: missing pieces are filled in and an existing
/// `forge.toml` is never overwritten.
pub fn init_project(project_dir: &Path, name: Option<&str>) -> Result<InitResult> {
    let forge_dir = get_forge_dir(project_dir);
    let created = !forge_dir.exists();

    std::fs::create_dir_all(&forge_dir)
        .with_context(|| format!("Failed to create directory: {}", forge_dir.display()))?;
    for sub in ["refs", "logs"] {
        let path = forge_dir.join(sub);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    let config_path = forge_dir.join("forge.toml");
    let wrote_config = !config_path.exists();
    if wrote_config {
        let mut config = ForgeToml::default();
        config.project.name = name.map(str::to_string);
        config.save(&config_path)?;
    }

    Ok(InitResult {
        forge_dir,
        created,
        wrote_config,
    })
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(FORGE_DIR).exists()
}

/// Get the path to the `.spriteforge` directory for a project.
pub fn get_forge_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(FORGE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_structure() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path(), None).unwrap();

        assert!(result.created);
        assert!(result.wrote_config);
        assert_eq!(result.forge_dir, dir.path().join(".spriteforge"));
        assert!(result.forge_dir.join("refs").is_dir());
        assert!(result.forge_dir.join("logs").is_dir());
        assert!(result.forge_dir.join("forge.toml").is_file());
    }

    #[test]
    fn test_init_project_writes_loadable_config() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path(), Some("heroes")).unwrap();
        let config = ForgeToml::load(&result.forge_dir.join("forge.toml")).unwrap();
        assert_eq!(config.project.name.as_deref(), Some("heroes"));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_init_project_twice_keeps_config() {
        let dir = tempdir().unwrap();
        init_project(dir.path(), None).unwrap();
        let config_path = dir.path().join(".spriteforge/forge.toml");
        std::fs::write(&config_path, "[project]\nname = \"mine\"\n").unwrap();

        let again = init_project(dir.path(), Some("other")).unwrap();
        assert!(!again.created);
        assert!(!again.wrote_config);
        assert_eq!(
            std::fs::read_to_string(config_path).unwrap(),
            "[project]\nname = \"mine\"\n"
        );
    }

    #[test]
    fn test_is_initialized() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
        init_project(dir.path(), None).unwrap();
        assert!(is_initialized(dir.path()));
    }
}
