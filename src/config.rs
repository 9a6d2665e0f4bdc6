use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::forge_config::ForgeToml;
use crate::init::FORGE_DIR;
use crate::synthesis::SynthesisSettings;

/// Runtime configuration for a spriteforge project.
///
/// Resolves every on-disk location under `.spriteforge/` and layers CLI
/// overrides on top of `forge.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub forge_dir: PathBuf,
    pub vault_file: PathBuf,
    pub session_file: PathBuf,
    pub refs_dir: PathBuf,
    pub log_dir: PathBuf,
    pub export_dir: PathBuf,
    pub lock_file: PathBuf,
    pub verbose: bool,
    toml: ForgeToml,
    model_override: Option<String>,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let forge_dir = project_dir.join(FORGE_DIR);
        let toml = ForgeToml::load_or_default(&forge_dir)?;

        Ok(Self {
            vault_file: forge_dir.join("vault.db"),
            session_file: forge_dir.join("session.json"),
            refs_dir: forge_dir.join("refs"),
            log_dir: forge_dir.join("logs"),
            export_dir: project_dir.join("exports"),
            lock_file: forge_dir.join("generate.lock"),
            project_dir,
            forge_dir,
            verbose,
            toml,
            model_override: None,
        })
    }

    /// Override the configured model for this invocation.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_override = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn forge_toml(&self) -> &ForgeToml {
        &self.toml
    }

    pub fn project_name(&self) -> String {
        self.toml.project.name.clone().unwrap_or_else(|| {
            self.project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "spriteforge".to_string())
        })
    }

    pub fn synth_cmd(&self) -> String {
        self.toml.synth_cmd()
    }

    pub fn synth_args(&self) -> &[String] {
        &self.toml.project.synth_args
    }

    /// Synthesis settings after CLI overrides.
    pub fn synthesis_settings(&self) -> SynthesisSettings {
        let mut settings = self.toml.synthesis_settings();
        if let Some(model) = &self.model_override {
            settings.model = model.clone();
        }
        settings
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.forge_dir).context("Failed to create .spriteforge directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::create_dir_all(&self.refs_dir).context("Failed to create refs directory")?;
        Ok(())
    }
}
