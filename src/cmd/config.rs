//! Configuration view and validation commands: `spriteforge config`, `spriteforge chain`.

use anyhow::Result;
use console::style;
use std::path::Path;

use spriteforge::forge_config::ForgeToml;
use spriteforge::init::get_forge_dir;
use spriteforge::ui::icons::{CHECK, CROSS};

use super::super::{ChainCommands, ConfigCommands};

fn print_toml(toml: &ForgeToml) {
    if toml.project.name.is_some() || toml.project.synth_cmd.is_some() {
        println!("[project]");
        if let Some(name) = &toml.project.name {
            println!("  name = \"{}\"", name);
        }
        if let Some(cmd) = &toml.project.synth_cmd {
            println!("  synth_cmd = \"{}\"", cmd);
        }
        if !toml.project.synth_args.is_empty() {
            println!("  synth_args = {:?}", toml.project.synth_args);
        }
        println!();
    }

    println!("[synthesis]");
    println!("  model = \"{}\"", toml.synthesis.model);
    println!("  aspect_ratio = \"{}\"", toml.synthesis.aspect_ratio);
    println!("  size = \"{}\"", toml.synthesis.size);
    println!("  background = \"{}\"", toml.synthesis.background);
    println!();
    println!("[chroma]");
    println!("  threshold = {}", toml.chroma.threshold);
    println!("  feather = {}", toml.chroma.feather);
    println!();
    println!("[drift]");
    println!("  warn_threshold = {}", toml.drift.warn_threshold);
    println!();
    println!(
        "chain: {} directives, {} active",
        toml.chain.len(),
        toml.chain.active_count()
    );
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let forge_dir = get_forge_dir(project_dir);
    let config_path = forge_dir.join("forge.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("spriteforge Configuration");
            println!("=========================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                ForgeToml::load(&config_path)?
            } else {
                println!("No forge.toml found at {}", config_path.display());
                println!("Using default configuration:");
                println!();
                ForgeToml::default()
            };
            print_toml(&toml);

            // Effective values (including env overrides)
            println!("Effective values (with env overrides):");
            println!("  synth_cmd = \"{}\"", toml.synth_cmd());
            println!("  model = \"{}\"", toml.model());
            println!();
            if !config_path.exists() {
                println!("Run 'spriteforge config init' to create a forge.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No forge.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ForgeToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("forge.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !forge_dir.exists() {
                std::fs::create_dir_all(&forge_dir)?;
            }

            let toml = ForgeToml::default();
            toml.save(&config_path)?;

            println!("Created forge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] name, synth_cmd, synth_args");
            println!("  - [synthesis] model, aspect_ratio, size, background");
            println!("  - [chroma] threshold, feather");
            println!("  - [[chain]] instruction directives");
            println!();
        }
    }

    Ok(())
}

pub fn cmd_chain(project_dir: &Path, command: Option<ChainCommands>) -> Result<()> {
    let forge_dir = get_forge_dir(project_dir);
    let config_path = forge_dir.join("forge.toml");
    let mut toml = ForgeToml::load_or_default(&forge_dir)?;

    let (id, active) = match command {
        None | Some(ChainCommands::List) => {
            println!();
            for (i, directive) in toml.chain.directives().iter().enumerate() {
                let status = if directive.active { CHECK } else { CROSS };
                let lock = if directive.locked { " [locked]" } else { "" };
                println!(
                    "{:>2}. {}{} {}{}",
                    i + 1,
                    status,
                    style(&directive.id).cyan(),
                    style(&directive.label).bold(),
                    style(lock).dim()
                );
                if !directive.description.is_empty() {
                    println!("      {}", style(&directive.description).dim());
                }
            }
            println!();
            return Ok(());
        }
        Some(ChainCommands::Enable { id }) => (id, true),
        Some(ChainCommands::Disable { id }) => (id, false),
    };

    toml.chain.set_active(&id, active)?;
    if !forge_dir.exists() {
        std::fs::create_dir_all(&forge_dir)?;
    }
    toml.save(&config_path)?;
    println!(
        "Directive {} {}",
        style(&id).cyan(),
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}
