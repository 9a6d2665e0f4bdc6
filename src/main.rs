use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "spriteforge")]
#[command(version, about = "Staged pixel-art sprite forge with gear lineage")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Model identifier. Overrides forge.toml and SPRITEFORGE_MODEL.
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new spriteforge project
    Init {
        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Show the current phase, references and last error
    Status {
        /// Clear the recorded error
        #[arg(long)]
        clear_error: bool,
    },
    /// Upload the character image (INTAKE → EXTRACTION)
    Upload { image: PathBuf },
    /// Extract the base body (EXTRACTION → IDENTITY)
    Extract {
        /// Body design; defaults to a bare mannequin
        #[arg(short, long)]
        prompt: Option<String>,
        /// Use this image instead of the uploaded one
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Refine face and hair (IDENTITY → GEAR)
    Refine { prompt: String },
    /// Synthesize a gear layer on top of the active asset
    Gear { prompt: String },
    /// Make an asset the active parent for the next gear layer
    Select { id: String },
    /// Show the gear lineage grouped by evolution step
    Tree,
    /// Delete an asset from the vault
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Measure silhouette drift of an asset against the identity base
    Drift { id: String },
    /// Export the current reference image
    Export {
        /// Key out the background
        #[arg(short, long)]
        transparent: bool,
        /// Output directory (defaults to ./exports)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Remove the background of any image file
    Key {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        feather: Option<f64>,
    },
    /// Start over from INTAKE (the vault is kept)
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// List or toggle instruction chain directives
    Chain {
        #[command(subcommand)]
        command: Option<ChainCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default forge.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum ChainCommands {
    /// List directives in chain order
    List,
    /// Activate a directive
    Enable { id: String },
    /// Deactivate a directive
    Disable { id: String },
}

/// Install the tracing subscriber. Returns the file writer guard, which
/// must live until exit.
fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default = if verbose {
        "spriteforge=debug"
    } else {
        "spriteforge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Terminal output belongs to the command; logs only surface warnings there
    let stderr_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let json_logs = std::env::var("SPRITEFORGE_LOG_JSON").unwrap_or_default() == "1";
    let stderr_layer = if json_logs {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(stderr_level)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(stderr_level)
            .boxed()
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "spriteforge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_dir = spriteforge::init::get_forge_dir(&project_dir).join("logs");
    let _log_guard = init_logging(cli.verbose, log_dir.is_dir().then_some(log_dir.as_path()))?;

    match &cli.command {
        Commands::Init { name } => cmd::cmd_init(&project_dir, name.as_deref())?,
        Commands::Status { clear_error } => {
            cmd::cmd_status(&project_dir, &cli, *clear_error).await?
        }
        Commands::Upload { image } => cmd::cmd_upload(&project_dir, &cli, image).await?,
        Commands::Extract { prompt, source } => {
            cmd::cmd_extract(&project_dir, &cli, prompt.as_deref(), source.as_deref()).await?
        }
        Commands::Refine { prompt } => cmd::cmd_refine(&project_dir, &cli, prompt).await?,
        Commands::Gear { prompt } => cmd::cmd_gear(&project_dir, &cli, prompt).await?,
        Commands::Select { id } => cmd::cmd_select(&project_dir, &cli, id).await?,
        Commands::Tree => cmd::cmd_tree(&project_dir, &cli).await?,
        Commands::Delete { id, force } => {
            cmd::cmd_delete(&project_dir, &cli, id, *force).await?
        }
        Commands::Drift { id } => cmd::cmd_drift(&project_dir, &cli, id).await?,
        Commands::Export { transparent, out } => {
            cmd::cmd_export(&project_dir, &cli, *transparent, out.as_deref()).await?
        }
        Commands::Key {
            input,
            output,
            threshold,
            feather,
        } => cmd::cmd_key(&project_dir, input, output, *threshold, *feather).await?,
        Commands::Reset { force } => cmd::cmd_reset(&project_dir, &cli, *force)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Chain { command } => cmd::cmd_chain(&project_dir, command.clone())?,
    }

    Ok(())
}
