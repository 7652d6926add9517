//! Codeswitch Bench CLI
//!
//! Runs the dialect-retention benchmark against hosted LLM APIs and reports on
//! the results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codeswitch_bench::{
    adapter_for, read_records, BatchRunner, ModelAdapter, OpenMode, ResultStore, RunConfig,
    RunReport, RunnerConfig, StatConfig, StimulusSet, Target,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeswitch-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stimulus against every configured model
    Run {
        /// Run configuration (YAML)
        #[arg(long, default_value = "config/run.yaml")]
        config: PathBuf,

        /// Stimulus CSV file or glob pattern
        #[arg(long, default_value = "data/stimuli.csv")]
        stimuli: String,

        /// Result file (.csv or .jsonl)
        #[arg(long, default_value = "results/responses.csv")]
        output: PathBuf,

        /// Only run these models (comma-separated names from the config)
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,

        /// Truncate the result file instead of appending
        #[arg(long)]
        fresh: bool,

        /// Leave out models whose API key is not set instead of failing
        #[arg(long)]
        skip_missing_keys: bool,
    },

    /// Summarise a result file
    Report {
        /// Result file to read (.csv or .jsonl)
        #[arg(long)]
        input: PathBuf,

        /// Output report file (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Bootstrap resamples for confidence intervals
        #[arg(long, default_value = "10000")]
        bootstrap: usize,
    },

    /// Show stimulus statistics
    Stimuli {
        /// Stimulus CSV file or glob pattern
        #[arg(long, default_value = "data/stimuli.csv")]
        path: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("failed to load .env: {e}"),
    }

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            stimuli,
            output,
            models,
            fresh,
            skip_missing_keys,
        } => run(
            &config,
            &stimuli,
            &output,
            &models,
            RunFlags {
                fresh,
                skip_missing_keys,
            },
        ),
        Commands::Report {
            input,
            output,
            format,
            bootstrap,
        } => report(&input, output.as_deref(), format, bootstrap),
        Commands::Stimuli { path } => show_stimuli(&path),
    }
}

fn load_stimuli(spec: &str) -> Result<StimulusSet> {
    let set = if spec.contains(['*', '?', '[']) {
        StimulusSet::load_glob(spec)
    } else {
        StimulusSet::load(spec)
    };
    set.with_context(|| format!("Failed to load stimuli from {spec}"))
}

#[derive(Clone, Copy)]
struct RunFlags {
    fresh: bool,
    skip_missing_keys: bool,
}

fn run(
    config_path: &Path,
    stimuli: &str,
    output: &Path,
    only: &[String],
    flags: RunFlags,
) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let stimuli = load_stimuli(stimuli)?;
    let lookup = |name: &str| std::env::var(name).ok();
    let models = if flags.skip_missing_keys {
        let (models, skipped) = config.resolve_available_models(only, lookup)?;
        for err in &skipped {
            tracing::warn!("skipping model: {err}");
        }
        if models.is_empty() {
            anyhow::bail!("No models left to run: every selected model is missing its API key");
        }
        models
    } else {
        config.resolve_models(only, lookup)?
    };
    let lexicon = config.marker_lexicon()?;

    tracing::info!(
        config = %config_path.display(),
        stimuli = stimuli.len(),
        models = ?models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        output = %output.display(),
        fresh = flags.fresh,
        "Starting benchmark run"
    );

    let adapters = models
        .iter()
        .map(|m| adapter_for(m.provider, config.request.timeout()))
        .collect::<Result<Vec<Box<dyn ModelAdapter>>, _>>()?;
    let targets: Vec<Target<'_>> = models
        .into_iter()
        .zip(&adapters)
        .map(|(model, adapter)| Target::new(model, adapter.as_ref()))
        .collect();

    let mode = if flags.fresh {
        OpenMode::Fresh
    } else {
        OpenMode::Append
    };
    let mut store = ResultStore::open(output, mode)
        .with_context(|| format!("Failed to open result file {}", output.display()))?;

    let runner = BatchRunner::new(RunnerConfig::from_run_config(&config), lexicon);
    let outcome = runner.run(&stimuli, &targets, &mut store)?;

    println!("Run {} complete", outcome.run_id);
    println!("Records:   {}", outcome.records);
    println!("Successes: {}", outcome.successes);
    println!("Failures:  {}", outcome.failures);
    if !outcome.disabled_models.is_empty() {
        println!(
            "Disabled (authentication failed): {}",
            outcome.disabled_models.join(", ")
        );
    }
    println!("Results written to {}", output.display());
    Ok(())
}

fn report(input: &Path, output: Option<&Path>, format: ReportFormat, bootstrap: usize) -> Result<()> {
    let records = read_records(input)
        .with_context(|| format!("Failed to read results from {}", input.display()))?;
    tracing::info!(input = %input.display(), records = records.len(), "Generating report");

    let stat_config = StatConfig {
        bootstrap_n: bootstrap,
        ..StatConfig::default()
    };
    let report = RunReport::from_records(&records, &stat_config);
    let rendered = match format {
        ReportFormat::Markdown => report.to_markdown(),
        ReportFormat::Json => report.to_json()?,
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn show_stimuli(path: &str) -> Result<()> {
    let stimuli = load_stimuli(path)?;
    let stats = stimuli.stats();

    println!("Stimulus Statistics");
    println!("===================");
    println!("Source: {path}");
    println!("Total stimuli: {}", stats.total);
    println!("With explicit markers: {}", stats.with_markers);
    println!();
    println!("By variety:");
    for (variety, count) in &stats.by_variety {
        println!("  - {variety}: {count}");
    }
    println!("By task:");
    for (task, count) in &stats.by_task {
        println!("  - {task}: {count}");
    }
    Ok(())
}
