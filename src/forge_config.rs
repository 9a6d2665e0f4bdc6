//! Project configuration read from `.spriteforge/forge.toml`.
//!
//! Layered as file → environment → CLI. Every section and field has a
//! default, so a missing or empty file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-sprites"
//! synth_cmd = "spriteforge-gemini"
//! synth_args = ["--region", "eu"]
//!
//! [synthesis]
//! model = "gemini-2.5-flash-image"
//! aspect_ratio = "1:1"
//! size = "1K"
//! background = "magenta"
//!
//! [chroma]
//! threshold = 45.0
//! feather = 2.0
//!
//! [drift]
//! warn_threshold = 15.0
//!
//! [[chain]]
//! id = "engine-core"
//! label = "SPRITE ENGINE"
//! instruction = "ROLE: Professional JRPG Pixel Artist."
//! locked = true
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::asset::{AspectRatio, ImageSize};
use crate::pixel::ChromaKeySettings;
use crate::synthesis::{
    BackgroundStyle, DEFAULT_MODEL, InstructionChain, SynthesisSettings, default_chain,
    model_accepts_size,
};

/// Default external synthesis command.
pub const DEFAULT_SYNTH_CMD: &str = "spriteforge-gemini";

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Synthesis command (default: "spriteforge-gemini")
    #[serde(default)]
    pub synth_cmd: Option<String>,
    /// Extra arguments passed to the synthesis command
    #[serde(default)]
    pub synth_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    /// Output size hint; only sent to models that accept one
    #[serde(default)]
    pub size: ImageSize,
    #[serde(default)]
    pub background: BackgroundStyle,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for SynthesisSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            aspect_ratio: AspectRatio::default(),
            size: ImageSize::default(),
            background: BackgroundStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSection {
    /// Drift percentage above which `spriteforge drift` warns
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: f64,
}

fn default_warn_threshold() -> f64 {
    15.0
}

impl Default for DriftSection {
    fn default() -> Self {
        Self {
            warn_threshold: default_warn_threshold(),
        }
    }
}

/// Root of `forge.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub synthesis: SynthesisSection,
    #[serde(default)]
    pub chroma: ChromaKeySettings,
    #[serde(default)]
    pub drift: DriftSection,
    /// Ordered instruction chain
    #[serde(default = "default_chain")]
    pub chain: InstructionChain,
}

impl Default for ForgeToml {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            synthesis: SynthesisSection::default(),
            chroma: ChromaKeySettings::default(),
            drift: DriftSection::default(),
            chain: default_chain(),
        }
    }
}

impl ForgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse forge.toml")
    }

    /// Load `forge.toml` from `forge_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(forge_dir: &Path) -> Result<Self> {
        let config_path = forge_dir.join("forge.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize forge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Synthesis command (file → env → default).
    pub fn synth_cmd(&self) -> String {
        self.project
            .synth_cmd
            .clone()
            .or_else(|| std::env::var("SPRITEFORGE_SYNTH_CMD").ok())
            .unwrap_or_else(|| DEFAULT_SYNTH_CMD.to_string())
    }

    /// Model identifier. The environment overrides the file.
    pub fn model(&self) -> String {
        std::env::var("SPRITEFORGE_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.synthesis.model.clone())
    }

    pub fn synthesis_settings(&self) -> SynthesisSettings {
        SynthesisSettings {
            model: self.model(),
            aspect_ratio: self.synthesis.aspect_ratio,
            size: self.synthesis.size,
            background: self.synthesis.background,
            chain: self.chain.clone(),
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = self.chroma.validate() {
            warnings.push(format!("[chroma] {}", e));
        }
        if !self.drift.warn_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.drift.warn_threshold)
        {
            warnings.push(format!(
                "[drift] warn_threshold {} should be a percentage between 0 and 100",
                self.drift.warn_threshold
            ));
        }
        if self.synthesis.model.trim().is_empty() {
            warnings.push("[synthesis] model is empty".to_string());
        }
        if self.synthesis.size != ImageSize::default() && !model_accepts_size(&self.synthesis.model)
        {
            warnings.push(format!(
                "[synthesis] size '{}' is ignored by model '{}'",
                self.synthesis.size, self.synthesis.model
            ));
        }
        if !self.synthesis.background.is_solid() {
            warnings.push(format!(
                "[synthesis] background '{}' is not a solid color; transparent export will not key it out cleanly",
                self.synthesis.background
            ));
        }

        let mut seen = HashSet::new();
        for directive in self.chain.directives() {
            if !seen.insert(directive.id.as_str()) {
                warnings.push(format!("[[chain]] duplicate directive id '{}'", directive.id));
            }
            if directive.instruction.trim().is_empty() {
                warnings.push(format!("[[chain]] directive '{}' has an empty instruction", directive.id));
            }
            if directive.locked && !directive.active {
                warnings.push(format!(
                    "[[chain]] directive '{}' is locked but inactive",
                    directive.id
                ));
            }
        }

        warnings
    }
}
