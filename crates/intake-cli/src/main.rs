use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use intake_core::ParseMode;
use intake_runtime::backend::{BackendRegistry, LocalBackendFactory};
use intake_runtime::{EngineConfig, ExtractionEngine, ExtractionResult};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliParseMode {
    Strict,
    Lenient,
}

impl From<CliParseMode> for ParseMode {
    fn from(mode: CliParseMode) -> Self {
        match mode {
            CliParseMode::Strict => ParseMode::Strict,
            CliParseMode::Lenient => ParseMode::Lenient,
        }
    }
}

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Structured field extraction from unstructured text", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[arg(
        long,
        short,
        global = true,
        default_value = "intake.yaml",
        help = "Path to the engine configuration file"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Extract fields from one input")]
    Parse {
        #[arg(help = "Input file (reads from stdin if omitted)")]
        file: Option<PathBuf>,

        #[arg(long, value_enum, help = "Parse mode (defaults to the configured mode)")]
        mode: Option<CliParseMode>,
    },

    #[command(about = "Extract fields from several inputs concurrently")]
    Batch {
        #[arg(required = true, help = "Input files, one document per file")]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, help = "Parse mode (defaults to the configured mode)")]
        mode: Option<CliParseMode>,
    },

    #[command(about = "Check that the configured backend is reachable")]
    Check,

    #[command(about = "Validate the configuration file without running anything")]
    ValidateConfig,
}

fn registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(LocalBackendFactory));
    registry
}

fn load_engine(config_path: &Path) -> Result<ExtractionEngine> {
    let config = EngineConfig::from_yaml_file(config_path)
        .with_context(|| format!("failed to load '{}'", config_path.display()))?;

    let backend_settings = config
        .backend
        .as_ref()
        .context("configuration has no backend section")?;

    let backend = registry()
        .create(&backend_settings.kind, &backend_settings.options)
        .with_context(|| format!("failed to create '{}' backend", backend_settings.kind))?;
    tracing::debug!(
        config = %config_path.display(),
        backend = %backend_settings.kind,
        "engine configured"
    );

    ExtractionEngine::new(&config, backend).context("invalid engine configuration")
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read from stdin")?;
            Ok(buffer)
        }
    }
}

fn result_to_json(result: &ExtractionResult) -> Result<serde_json::Value> {
    let value = match result {
        Ok(document) => serde_json::json!({ "ok": document }),
        Err(descriptor) => serde_json::json!({ "error": descriptor }),
    };
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { file, mode } => {
            let engine = load_engine(&cli.config)?;
            let mode = mode.map(ParseMode::from).unwrap_or(engine.default_mode());

            let text = read_input(file.as_deref())?;
            let result = engine.parse(&text, mode).await;

            match result {
                Ok(document) => {
                    println!("{}", serde_json::to_string_pretty(&document)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(descriptor) => {
                    println!("{}", serde_json::to_string_pretty(&descriptor)?);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Batch { files, mode } => {
            let engine = load_engine(&cli.config)?;
            let mode = mode.map(ParseMode::from).unwrap_or(engine.default_mode());

            let texts = files
                .iter()
                .map(|path| read_input(Some(path)))
                .collect::<Result<Vec<_>>>()?;

            let results = engine.parse_batch(&texts, mode).await;
            let report = results
                .iter()
                .map(result_to_json)
                .collect::<Result<Vec<_>>>()?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            let failures = results.iter().filter(|r| r.is_err()).count();
            if failures > 0 {
                eprintln!("{failures} of {} inputs failed", results.len());
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Commands::Check => {
            let engine = load_engine(&cli.config)?;
            if engine.check_backend_reachable().await {
                println!("backend reachable");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("backend unreachable");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::ValidateConfig => {
            let config = EngineConfig::from_yaml_file(&cli.config)
                .with_context(|| format!("failed to load '{}'", cli.config.display()))?;
            config.validate().context("configuration is invalid")?;

            if let Some(backend) = &config.backend {
                registry()
                    .validate_config(&backend.kind, &backend.options)
                    .with_context(|| format!("'{}' backend configuration invalid", backend.kind))?;
                println!("configuration valid ({} backend)", backend.kind);
            } else {
                println!("configuration valid (no backend configured)");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
