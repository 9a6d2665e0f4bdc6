//! Workflow commands: `upload`, `extract`, `refine`, `gear`.

use anyhow::{Context, Result, bail};
use console::style;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use spriteforge::asset::{AssetId, GeneratedAsset, ImageData};
use spriteforge::errors::ForgeError;
use spriteforge::export::ExportArtifact;
use spriteforge::phase::{Phase, Stage};
use spriteforge::ui::ForgeUI;

use super::super::Cli;
use super::project::Project;

fn read_image(path: &Path) -> Result<ImageData> {
    let image = ImageData::from_path(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    if !image.mime_type().starts_with("image/") {
        bail!(
            "{} does not look like an image ({})",
            path.display(),
            image.mime_type()
        );
    }
    Ok(image)
}

/// Drive one stage call with a spinner that shows elapsed time.
async fn drive<T>(
    ui: &ForgeUI,
    project: &Project,
    stage: Stage,
    call: impl Future<Output = Result<T, ForgeError>>,
) -> Result<T, ForgeError> {
    ui.show_phase(project.forge.phase()?);
    ui.start_stage(stage, &project.forge.settings().model);
    let started = Instant::now();

    tokio::pin!(call);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let result = loop {
        tokio::select! {
            result = &mut call => break result,
            _ = ticker.tick() => ui.update_elapsed(started.elapsed()),
        }
    };

    match &result {
        Ok(_) => ui.stage_complete(stage, started.elapsed()),
        Err(e) => ui.stage_failed(stage, &e.to_string()),
    }
    ui.finish();
    result
}

fn hint_for(err: &ForgeError) -> Option<&'static str> {
    if err.is_retryable() {
        Some("The synthesis call can be retried with the same command.")
    } else if err.is_precondition() {
        Some("Run `spriteforge status` to see the current phase.")
    } else {
        None
    }
}

fn report(err: ForgeError) -> anyhow::Error {
    if let Some(hint) = hint_for(&err) {
        eprintln!("{}", style(hint).dim());
    }
    err.into()
}

pub async fn cmd_upload(project_dir: &Path, cli: &Cli, image: &Path) -> Result<()> {
    let project = Project::open_exclusive(project_dir, cli).await?;
    let image = read_image(image)?;
    let size = image.len();

    let result = project.forge.upload(image);
    project.save()?;
    result.map_err(report)?;

    println!(
        "Uploaded {} ({} bytes). Phase: {}",
        style("character image").cyan(),
        size,
        style(Phase::Extraction).yellow()
    );
    println!("Next: `spriteforge extract` to forge the base body.");
    Ok(())
}

pub async fn cmd_extract(
    project_dir: &Path,
    cli: &Cli,
    prompt: Option<&str>,
    source: Option<&Path>,
) -> Result<()> {
    let project = Project::open_exclusive(project_dir, cli).await?;
    let source = source.map(read_image).transpose()?;

    let ui = ForgeUI::new(cli.verbose);
    let prompt = prompt.unwrap_or_default();
    let result = drive(
        &ui,
        &project,
        Stage::Extraction,
        project.forge.extract_base(prompt, source),
    )
    .await;
    project.save()?;
    let image = result.map_err(report)?;

    println!(
        "Base body locked ({} bytes). Phase: {}",
        image.len(),
        style(Phase::Identity).yellow()
    );
    println!("Next: `spriteforge refine \"<face and hair traits>\"`.");
    Ok(())
}

pub async fn cmd_refine(project_dir: &Path, cli: &Cli, prompt: &str) -> Result<()> {
    let project = Project::open_exclusive(project_dir, cli).await?;

    let ui = ForgeUI::new(cli.verbose);
    let result = drive(
        &ui,
        &project,
        Stage::Identity,
        project.forge.refine_identity(prompt),
    )
    .await;
    project.save()?;
    let image = result.map_err(report)?;

    println!(
        "Identity locked ({} bytes). Phase: {}",
        image.len(),
        style(Phase::Gear).yellow()
    );
    println!("Next: `spriteforge gear \"<equipment>\"`.");
    Ok(())
}

pub async fn cmd_gear(project_dir: &Path, cli: &Cli, prompt: &str) -> Result<()> {
    let project = Project::open_exclusive(project_dir, cli).await?;

    let ui = ForgeUI::new(cli.verbose);
    let result = drive(
        &ui,
        &project,
        Stage::Gear,
        project.forge.synthesize_gear(prompt),
    )
    .await;
    let outcome = match result {
        Err(ForgeError::Unsaved { asset_id, source }) => {
            eprintln!("{} {}", style("Vault rejected the asset:").red(), source);
            recover_unsaved(&project, &asset_id).await
        }
        other => other.map_err(report),
    };
    project.save()?;
    let asset = outcome?;

    ui.show_asset(&asset);
    println!(
        "Step {} saved as {}. It is now the active parent.",
        asset.evolution_step,
        style(asset.id.short()).cyan()
    );

    // Advisory only; a failed check leaves the saved session untouched
    let threshold = project.config.forge_toml().drift.warn_threshold;
    if let Ok(report) = project.forge.check_drift(&asset.id).await {
        if report.exceeds(threshold) {
            ui.show_warning(&format!(
                "Silhouette drift {:.2}% exceeds {}%. Run `spriteforge drift {}` for details.",
                report.percent,
                threshold,
                asset.id.short()
            ));
        }
    }
    Ok(())
}

/// Offer to retry the vault write. Unsaved assets do not survive the
/// process, so a declined retry writes the image to the export directory.
async fn recover_unsaved(project: &Project, id: &AssetId) -> Result<GeneratedAsset> {
    use dialoguer::Confirm;

    loop {
        let retry = Confirm::new()
            .with_prompt("Retry saving the asset?")
            .default(true)
            .interact()
            .unwrap_or(false);
        if !retry {
            break;
        }
        match project.forge.retry_save(id).await {
            Ok(()) => {
                if let Some(asset) = project.forge.with_lineage(|tree| tree.get(id).cloned())? {
                    return Ok(asset);
                }
                break;
            }
            Err(e) => eprintln!("{} {}", style("Save failed again:").red(), e),
        }
    }

    let Some(asset) = project.forge.with_lineage(|tree| tree.get(id).cloned())? else {
        bail!("Asset {} was not saved", id.short());
    };
    let artifact = ExportArtifact::new(Phase::Gear, asset.image.clone(), false, asset.created_at);
    let path = artifact.write_to(&project.config.export_dir)?;
    bail!(
        "Asset {} was not saved to the vault; its image was written to {}",
        id.short(),
        path.display()
    )
}
