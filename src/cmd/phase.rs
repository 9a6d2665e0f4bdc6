//! Workflow status and reset commands.

use anyhow::{Result, bail};
use console::style;
use std::path::Path;

use spriteforge::asset::ImageData;
use spriteforge::config::Config;
use spriteforge::init::is_initialized;
use spriteforge::orchestrator::SessionStore;
use spriteforge::phase::Phase;
use spriteforge::ui::icons::{CHECK, CROSS, WARN};
use spriteforge::workflow::ReferenceSlot;

use super::super::Cli;
use super::project::{Project, acquire_project_lock};

fn describe(image: Option<&ImageData>) -> String {
    match image {
        Some(image) => format!("{} {} ({} bytes)", CHECK, image.mime_type(), image.len()),
        None => format!("{} -", CROSS),
    }
}

fn next_step(phase: Phase) -> &'static str {
    match phase {
        Phase::Intake => "spriteforge upload <image>",
        Phase::Extraction => "spriteforge extract [--prompt <design>]",
        Phase::Identity => "spriteforge refine \"<face and hair traits>\"",
        Phase::Gear => "spriteforge gear \"<equipment>\"",
    }
}

pub async fn cmd_status(project_dir: &Path, cli: &Cli, clear_error: bool) -> Result<()> {
    let project = if clear_error {
        Project::open_exclusive(project_dir, cli).await?
    } else {
        Project::open(project_dir, cli).await?
    };
    if clear_error {
        project.forge.clear_error()?;
        project.save()?;
    }
    let state = project.forge.snapshot()?;
    let (assets, steps) = project
        .forge
        .with_lineage(|tree| (tree.len(), tree.by_step().len()))?;

    println!();
    println!(
        "{} {}",
        style("Project:").bold(),
        project.config.project_name()
    );
    println!("{} {}", style("Phase:").bold(), style(state.phase).yellow());
    println!(
        "{} {}",
        style("Model:").bold(),
        project.forge.settings().model
    );
    println!();
    for slot in ReferenceSlot::ALL {
        println!("  {:<15} {}", slot.as_str(), describe(state.reference(slot)));
    }
    match &state.active_parent {
        Some(asset) => println!(
            "  {:<15} {} step {} \"{}\"",
            "active_parent",
            style(asset.id.short()).cyan(),
            asset.evolution_step,
            asset.prompt
        ),
        None => println!("  {:<15} -", "active_parent"),
    }
    if let Some(draft) = &state.prompt_draft {
        println!("  {:<15} \"{}\"", "prompt_draft", draft);
    }
    println!();
    println!("Vault: {} assets across {} evolution steps", assets, steps);

    if let Some(err) = &state.last_error {
        println!();
        println!("{}{}", WARN, style(format!("Last error: {}", err)).red());
        println!(
            "{}",
            style("Clear it with `spriteforge status --clear-error`.").dim()
        );
    }
    println!();
    println!("Next: `{}`", next_step(state.phase));
    println!();
    Ok(())
}

/// Discard the session (references, active parent, drafts and last error).
/// Works without loading the session, so it also recovers a corrupt one.
pub fn cmd_reset(project_dir: &Path, cli: &Cli, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    if !is_initialized(project_dir) {
        bail!("No spriteforge project found. Run 'spriteforge init' first.");
    }
    let config = Config::new(project_dir.to_path_buf(), cli.verbose)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will discard the current references and return to INTAKE. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let _lock = acquire_project_lock(&config)?;
    SessionStore::new(config.session_file.clone(), config.refs_dir.clone()).clear()?;

    println!("Reset complete. The asset vault was kept.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_step_per_phase() {
        assert!(next_step(Phase::Intake).contains("upload"));
        assert!(next_step(Phase::Extraction).contains("extract"));
        assert!(next_step(Phase::Identity).contains("refine"));
        assert!(next_step(Phase::Gear).contains("gear"));
    }

    #[test]
    fn test_describe_missing_reference() {
        assert!(describe(None).ends_with('-'));
        assert!(describe(Some(&ImageData::png(vec![1, 2]))).contains("2 bytes"));
    }
}
