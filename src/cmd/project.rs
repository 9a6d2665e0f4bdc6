//! Project initialization and the per-invocation workspace.

use anyhow::{Context, Result, anyhow, bail};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use spriteforge::asset::{AssetId, GeneratedAsset};
use spriteforge::config::Config;
use spriteforge::init::{init_project, is_initialized};
use spriteforge::orchestrator::{ForgeOrchestrator, SessionStore};
use spriteforge::storage::sqlite::SqliteAssetStore;
use spriteforge::synthesis::CommandSynthesizer;

use super::super::Cli;

pub fn cmd_init(project_dir: &Path, name: Option<&str>) -> Result<()> {
    let was_initialized = is_initialized(project_dir);

    let result = init_project(project_dir, name)?;

    if result.created {
        println!(
            "Initialized spriteforge project at {}",
            result.forge_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .spriteforge/");
        println!("  ├── forge.toml    # Configuration (use `spriteforge config`)");
        println!("  ├── refs/         # Session reference images");
        println!("  └── logs/");
        println!();
        println!("Next steps:");
        println!("  1. Run `spriteforge upload <image>` with a character picture");
        println!("  2. Run `spriteforge extract` to forge the base body");
        println!("  3. Run `spriteforge refine \"<face and hair>\"` to lock the identity");
        println!("  4. Run `spriteforge gear \"<gear>\"` to layer equipment");
    } else if was_initialized {
        println!(
            "spriteforge project already initialized at {}",
            result.forge_dir.display()
        );
        if result.wrote_config {
            println!("Restored missing forge.toml.");
        }
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed spriteforge initialization at {}",
            result.forge_dir.display()
        );
    }

    Ok(())
}

/// Take the project lock without waiting. Held until the file is dropped.
pub fn acquire_project_lock(config: &Config) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_file)
        .with_context(|| format!("Failed to open {}", config.lock_file.display()))?;
    file.try_lock_exclusive().map_err(|_| {
        anyhow!("Another spriteforge process is already working in this project")
    })?;
    Ok(file)
}

fn open_config(project_dir: &Path, cli: &Cli) -> Result<Config> {
    if !is_initialized(project_dir) {
        bail!("No spriteforge project found. Run 'spriteforge init' first.");
    }
    let config =
        Config::new(project_dir.to_path_buf(), cli.verbose)?.with_model(cli.model.clone());
    config.ensure_directories()?;
    Ok(config)
}

/// An opened project: configuration, the orchestrator with its vault loaded
/// and the session restored.
pub struct Project {
    pub config: Config,
    pub forge: ForgeOrchestrator,
    sessions: SessionStore,
    /// Present when opened with `open_exclusive`
    lock: Option<File>,
}

impl Project {
    /// Open for reading. Must not be used by commands that save the session.
    pub async fn open(project_dir: &Path, cli: &Cli) -> Result<Self> {
        let config = open_config(project_dir, cli)?;
        Self::load(config, None).await
    }

    /// Take the project lock, then load the session. The lock is held until
    /// the project is dropped, so the loaded session cannot go stale and
    /// `save` cannot overwrite another process's work.
    pub async fn open_exclusive(project_dir: &Path, cli: &Cli) -> Result<Self> {
        let config = open_config(project_dir, cli)?;
        let lock = acquire_project_lock(&config)?;
        Self::load(config, Some(lock)).await
    }

    async fn load(config: Config, lock: Option<File>) -> Result<Self> {

        let store = SqliteAssetStore::new(&config.vault_file).with_context(|| {
            format!("Failed to open asset vault {}", config.vault_file.display())
        })?;
        let synthesizer = CommandSynthesizer::new(config.synth_cmd())
            .with_args(config.synth_args().to_vec())
            .with_working_dir(config.project_dir.clone());

        let forge = ForgeOrchestrator::new(
            Arc::new(synthesizer),
            Arc::new(store),
            config.synthesis_settings(),
        )
        .with_chroma(config.forge_toml().chroma);
        forge.bootstrap().await.context("Failed to load asset vault")?;

        let sessions = SessionStore::new(config.session_file.clone(), config.refs_dir.clone());
        if let Some(state) = forge.with_lineage(|tree| sessions.load(tree))?? {
            forge.restore(state)?;
        }

        Ok(Self {
            config,
            forge,
            sessions,
            lock,
        })
    }

    /// Persist the current workflow state.
    pub fn save(&self) -> Result<()> {
        if self.lock.is_none() {
            bail!("Session opened read-only; it cannot be saved");
        }
        let state = self.forge.snapshot()?;
        self.sessions.save(&state)
    }

    /// Resolve a full or abbreviated asset id against the lineage.
    pub fn resolve_asset(&self, id: &str) -> Result<GeneratedAsset> {
        if let Ok(full) = id.parse::<AssetId>() {
            if let Some(asset) = self.forge.with_lineage(|tree| tree.get(&full).cloned())? {
                return Ok(asset);
            }
        }
        let mut matches = self.forge.with_lineage(|tree| {
            tree.matching_prefix(id)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        })?;
        match matches.len() {
            0 => bail!("No asset matches '{}'. Run 'spriteforge tree' to list assets.", id),
            1 => Ok(matches.remove(0)),
            n => bail!("'{}' is ambiguous ({} assets match); use more characters", id, n),
        }
    }
}
