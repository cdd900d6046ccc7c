use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use modelyard::{
    gguf, ModelManager, ModelStatus, ResolvedLocation, Settings, SystemProbe,
};

#[derive(Parser)]
#[command(name = "modelyard", about = "Resolve, fetch and inspect local GGUF models")]
struct Cli {
    /// Path to a config file (defaults to ~/agentyard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical on-disk location for a model identifier
    Resolve { model: String },
    /// Download a model if it is not already present
    Fetch {
        model: String,
        /// Skip the download confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Read and print GGUF metadata from a model file
    Inspect {
        file: PathBuf,
        /// Dump the full metadata map as JSON
        #[arg(long)]
        json: bool,
    },
    /// List models installed under the models directory
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref());
    init_tracing(&settings);

    let manager = ModelManager::new(settings);

    match cli.command {
        Command::Resolve { model } => {
            let (id, location) = manager.resolve(&model);
            match location {
                ResolvedLocation::File(path) => {
                    println!("{} -> {} (config override)", id, path.display());
                }
                ResolvedLocation::Directory { dir, matched_file } => {
                    println!("{} -> {}", id, dir.display());
                    match matched_file {
                        Some(file) => println!("artifact: {}", file.display()),
                        None => println!("artifact: not downloaded"),
                    }
                }
            }
        }
        Command::Fetch { model, yes } => {
            let path = fetch(&manager, &model, yes).await?;
            println!("{}", path.display());
        }
        Command::Inspect { file, json } => {
            inspect(&file, json)?;
        }
        Command::List => {
            let models = manager.list_local();
            if models.is_empty() {
                println!("no models installed");
            }
            for model in models {
                println!("{}  {}", model.identifier, model.path.display());
            }
        }
    }

    Ok(())
}

async fn fetch(manager: &ModelManager, model: &str, yes: bool) -> Result<PathBuf> {
    match manager.status(model, &SystemProbe).await? {
        ModelStatus::Present(path) => {
            info!("model already present");
            Ok(path)
        }
        ModelStatus::NeedsDownload(plan) => {
            eprintln!(
                "recommended: {} ({:.1} GB, system capability: {})",
                plan.variant.filename,
                plan.variant.size_gb(),
                plan.capability
            );
            if !yes && !confirm("Download this model?")? {
                bail!("download cancelled");
            }
            let path = manager.download(&plan, true).await?;
            Ok(path)
        }
    }
}

fn inspect(file: &Path, json: bool) -> Result<()> {
    let info = gguf::read_model_info(file);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    if let Some(error) = &info.error {
        eprintln!("warning: {}", error);
    }
    println!("name:         {}", info.name);
    println!("architecture: {}", info.architecture);
    println!("quantization: {}", info.quantization);
    println!("size:         {:.2} GB", info.file_size_gb);
    println!("tensors:      {}", info.tensor_count);
    if let Some(ctx) = info.context_length {
        println!("context:      {}", ctx);
    }
    for (key, value) in &info.parameters {
        println!("{}: {}", key, value);
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [Y/n]: ", prompt);
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));

    if let Some(log_dir) = &settings.logging.file {
        let appender = tracing_appender::rolling::daily(log_dir, "modelyard");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        // Keep the flush guard alive for the process lifetime.
        Box::leak(Box::new(guard));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
