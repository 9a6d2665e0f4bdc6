//! Export and standalone chroma-key commands.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use spriteforge::asset::ImageData;
use spriteforge::forge_config::ForgeToml;
use spriteforge::init::{get_forge_dir, is_initialized};
use spriteforge::pixel::{ChromaKeyExtractor, ChromaKeySettings};
use spriteforge::ui::icons::FILE_NEW;

use super::super::Cli;
use super::project::Project;

pub async fn cmd_export(
    project_dir: &Path,
    cli: &Cli,
    transparent: bool,
    out: Option<&Path>,
) -> Result<()> {
    let project = Project::open_exclusive(project_dir, cli).await?;

    let result = project.forge.export(transparent).await;
    project.save()?;
    let artifact = result?;

    let dir = out.unwrap_or(&project.config.export_dir);
    let path = artifact.write_to(dir)?;
    println!(
        "{}Exported {}{}",
        FILE_NEW,
        style(path.display()).green(),
        if artifact.transparent {
            " (background removed)"
        } else {
            ""
        }
    );
    Ok(())
}

/// Chroma settings for `key`: project config when present, then flags.
fn key_settings(
    project_dir: &Path,
    threshold: Option<f64>,
    feather: Option<f64>,
) -> Result<ChromaKeySettings> {
    let mut settings = if is_initialized(project_dir) {
        ForgeToml::load_or_default(&get_forge_dir(project_dir))?.chroma
    } else {
        ChromaKeySettings::default()
    };
    if let Some(threshold) = threshold {
        settings.threshold = threshold;
    }
    if let Some(feather) = feather {
        settings.feather = feather;
    }
    Ok(settings)
}

pub async fn cmd_key(
    project_dir: &Path,
    input: &Path,
    output: &Path,
    threshold: Option<f64>,
    feather: Option<f64>,
) -> Result<()> {
    let settings = key_settings(project_dir, threshold, feather)?;
    let extractor = ChromaKeyExtractor::new(settings)?;
    let image = ImageData::from_path(input)
        .with_context(|| format!("Failed to read image {}", input.display()))?;

    let keyed = tokio::task::spawn_blocking(move || extractor.extract(&image))
        .await
        .context("Chroma key task failed")??;

    std::fs::write(output, keyed.bytes())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{}Wrote {} (threshold {}, feather {})",
        FILE_NEW,
        style(output.display()).green(),
        settings.threshold,
        settings.feather
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_settings_flags_override_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = key_settings(dir.path(), Some(10.0), None).unwrap();
        assert_eq!(settings.threshold, 10.0);
        assert_eq!(settings.feather, 2.0);
    }

    #[test]
    fn test_key_settings_read_project_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let forge_dir = get_forge_dir(dir.path());
        std::fs::create_dir_all(&forge_dir).unwrap();
        std::fs::write(forge_dir.join("forge.toml"), "[chroma]\nfeather = 6.0\n").unwrap();
        let settings = key_settings(dir.path(), None, None).unwrap();
        assert_eq!(settings.threshold, 45.0);
        assert_eq!(settings.feather, 6.0);
    }
}
