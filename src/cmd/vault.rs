//! Asset vault commands: `select`, `tree`, `delete`, `drift`.

use anyhow::Result;
use console::style;
use std::path::Path;

use spriteforge::asset::{AssetId, GeneratedAsset};
use spriteforge::lineage::LineageTree;
use spriteforge::ui::icons::{CHECK, FILE_DEL, WARN};

use super::super::Cli;
use super::project::Project;

pub async fn cmd_select(project_dir: &Path, cli: &Cli, id: &str) -> Result<()> {
    let project = Project::open_exclusive(project_dir, cli).await?;
    let asset = project.resolve_asset(id)?;

    let result = project.forge.select_asset(&asset.id);
    project.save()?;
    let asset = result?;

    println!(
        "{}Selected {} (step {}). Next gear layers build on it.",
        CHECK,
        style(asset.id.short()).cyan(),
        asset.evolution_step
    );
    println!("Prompt: \"{}\"", asset.prompt);
    Ok(())
}

fn parent_label(tree: &LineageTree, asset: &GeneratedAsset) -> String {
    match asset.parent_id {
        None => "identity".to_string(),
        Some(parent) if tree.contains(&parent) => parent.short(),
        Some(parent) => format!("{} (deleted)", parent.short()),
    }
}

fn render_tree(tree: &LineageTree, active: Option<AssetId>) -> Vec<String> {
    let mut lines = Vec::new();
    for (step, assets) in tree.by_step() {
        lines.push(format!("Step {}", step));
        for asset in assets {
            let marker = if Some(asset.id) == active { "*" } else { " " };
            lines.push(format!(
                "  {} {}  ← {:<18} {}",
                marker,
                asset.id.short(),
                parent_label(tree, asset),
                asset.prompt
            ));
        }
    }
    lines
}

pub async fn cmd_tree(project_dir: &Path, cli: &Cli) -> Result<()> {
    let project = Project::open(project_dir, cli).await?;
    let active = project.forge.snapshot()?.active_parent.map(|a| a.id);
    let lines = project.forge.with_lineage(|tree| render_tree(tree, active))?;

    println!();
    if lines.is_empty() {
        println!("The vault is empty. Run `spriteforge gear \"<equipment>\"` once the identity is locked.");
    } else {
        for line in lines {
            println!("{}", line);
        }
        println!();
        println!("{}", style("* active parent").dim());
    }
    println!();
    Ok(())
}

pub async fn cmd_delete(project_dir: &Path, cli: &Cli, id: &str, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let project = Project::open_exclusive(project_dir, cli).await?;
    let asset = project.resolve_asset(id)?;
    let children = project
        .forge
        .with_lineage(|tree| tree.children_of(&asset.id).len())?;

    if !force {
        let mut prompt = format!("Delete asset {} (\"{}\")?", asset.id.short(), asset.prompt);
        if children > 0 {
            prompt.push_str(&format!(" {} child asset(s) will keep a dangling parent.", children));
        }
        let confirm = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Delete cancelled");
            return Ok(());
        }
    }

    let result = project.forge.delete_asset(&asset.id).await;
    project.save()?;
    let removed = result?;

    println!("{}Deleted {}", FILE_DEL, style(removed.id.short()).cyan());
    Ok(())
}

pub async fn cmd_drift(project_dir: &Path, cli: &Cli, id: &str) -> Result<()> {
    let project = Project::open_exclusive(project_dir, cli).await?;
    let asset = project.resolve_asset(id)?;
    let threshold = project.config.forge_toml().drift.warn_threshold;

    let result = project.forge.check_drift(&asset.id).await;
    project.save()?;
    let report = result?;

    println!(
        "Silhouette drift of {}: {} ({} of {} subject pixels)",
        style(asset.id.short()).cyan(),
        style(format!("{:.2}%", report.percent)).bold(),
        report.drift_pixels,
        report.subject_pixels
    );
    if report.exceeds(threshold) {
        println!(
            "{}{}",
            WARN,
            style(format!(
                "Above the {:.1}% warning threshold; the body shape may have changed",
                threshold
            ))
            .yellow()
        );
    } else {
        println!("{}Within the {:.1}% threshold", CHECK, threshold);
    }
    Ok(())
}
