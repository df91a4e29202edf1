//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use slmforge_core::{
    DatasetWriter, DryRun, Pipeline, PipelineState, PluginRegistry, ProgressReporter, RunReport,
    SkippedResource, TrainingHandoff,
};
use slmforge_shared::{ForgeError, PipelineConfig, default_config_path, init_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// slmforge: build fine-tuning datasets from databases, documents and servers.
#[derive(Parser)]
#[command(
    name = "slmforge",
    version,
    about = "Ingest heterogeneous content and turn it into supervised training examples.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline and hand the examples to training.
    Run {
        /// Pipeline config (defaults to ~/.slmforge/pipeline.toml).
        #[arg(short, long, env = "SLMFORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Build the examples but write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check a config and construct its plugins without extracting anything.
    Validate {
        /// Pipeline config (defaults to ~/.slmforge/pipeline.toml).
        #[arg(short, long, env = "SLMFORGE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// List registered connector and task builder types.
    Plugins,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a starter pipeline config.
    Init {
        /// Where to write it (defaults to ~/.slmforge/pipeline.toml).
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved pipeline config.
    Show {
        #[arg(short, long, env = "SLMFORGE_CONFIG")]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "slmforge=info",
        1 => "slmforge=debug",
        _ => "slmforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { config, dry_run } => cmd_run(config.as_deref(), dry_run).await,
        Command::Validate { config } => cmd_validate(config.as_deref()),
        Command::Plugins => cmd_plugins(),
        Command::Config { action } => match action {
            ConfigAction::Init { path } => cmd_config_init(path.as_deref()),
            ConfigAction::Show { config } => cmd_config_show(config.as_deref()),
        },
    }
}

/// Resolve `--config` or fall back to the default location.
fn resolve_config(path: Option<&Path>) -> Result<(PathBuf, PipelineConfig)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        return Err(eyre!(
            "no pipeline config at {}; run `slmforge config init` first",
            path.display()
        ));
    }
    let config = load_config_from(&path)?;
    Ok((path, config))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: Option<&Path>, dry_run: bool) -> Result<()> {
    let (path, config) = resolve_config(config)?;
    let pipeline = Pipeline::new(config, Arc::new(PluginRegistry::with_builtins()))?;

    info!(config = %path.display(), dry_run, "starting run");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let handoff: &dyn TrainingHandoff = if dry_run { &DryRun } else { &DatasetWriter };
    let reporter = CliProgress::new();

    let report = match pipeline.run_with_cancel(cancel, handoff, &reporter).await {
        Ok(report) => report,
        Err(ForgeError::Cancelled { chunks_extracted }) => {
            reporter.spinner.finish_and_clear();
            println!("Run cancelled after {chunks_extracted} chunks; nothing was handed off.");
            return Ok(());
        }
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    let stats = &report.stats;

    println!();
    println!("  Run complete!");
    println!("  Run ID:     {}", report.run_id);
    println!("  Resources:  {}", stats.resources_loaded);
    println!(
        "  Chunks:     {} raw, {} cleaned, {} empty",
        stats.raw_chunks, stats.cleaned_chunks, stats.dropped_empty
    );
    println!("  Segments:   {}", stats.segments);
    println!("  Examples:   {}", report.examples);
    match &report.handoff.dataset_path {
        Some(path) => println!("  Dataset:    {}", path.display()),
        None => println!("  Dataset:    (dry run, nothing written)"),
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());

    if !report.skipped.is_empty() {
        println!();
        println!("  Skipped {} resource(s):", report.skipped.len());
        for skipped in &report.skipped {
            let resource = skipped.resource_id.as_deref().unwrap_or("<listing>");
            println!("    {} {resource}: {}", skipped.connector, skipped.error);
        }
    }
    println!();
}

fn cmd_validate(config: Option<&Path>) -> Result<()> {
    let (path, config) = resolve_config(config)?;
    let pipeline = Pipeline::new(config, Arc::new(PluginRegistry::with_builtins()))?;

    let connectors = pipeline.connectors()?;
    let builder = pipeline.task_builder()?;

    println!("{} is valid", path.display());
    for connector in &connectors {
        println!("  connector:    {}", connector.name());
    }
    println!("  task builder: {}", builder.name());
    println!("  max_chars:    {}", pipeline.config().processing.max_chars);
    Ok(())
}

fn cmd_plugins() -> Result<()> {
    let plugins = PluginRegistry::with_builtins();
    println!("Connectors:");
    for name in plugins.connectors.names() {
        println!("  {name}");
    }
    println!("Task builders:");
    for name in plugins.task_builders.names() {
        println!("  {name}");
    }
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    let path = init_config(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: Option<&Path>) -> Result<()> {
    let (_, config) = resolve_config(config)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, state: PipelineState) {
        let message = match state {
            PipelineState::ConnectorsReady => "Extracting resources".to_string(),
            PipelineState::Chunked => "Building examples".to_string(),
            PipelineState::ExamplesBuilt => "Handing off to training".to_string(),
            other => format!("Pipeline {other}"),
        };
        self.spinner.set_message(message);
    }

    fn resource_loaded(&self, connector: &str, resource_id: &str, chunks: usize) {
        self.spinner
            .set_message(format!("Loaded {connector} {resource_id} ({chunks} chunks)"));
    }

    fn resource_skipped(&self, skipped: &SkippedResource) {
        let resource = skipped.resource_id.as_deref().unwrap_or("<listing>");
        self.spinner
            .println(format!("  skipped {} {resource}: {}", skipped.connector, skipped.error));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
