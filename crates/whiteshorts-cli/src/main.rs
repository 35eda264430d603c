// Broadcast entry point.
//
// 1. Initialize tracing (stderr, so stdout stays valid JSON)
// 2. Load config (defaults copied on first run), apply overrides
// 3. Resolve and load the prediction dump
// 4. Run the pipeline and publish (or only the pipeline with --dry-run)
// 5. Print a preview of the processed records

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use whiteshorts_broadcast::input;
use whiteshorts_core::config::{self, Overrides};
use whiteshorts_core::Row;

#[derive(Parser, Debug)]
#[command(name = "whiteshorts-broadcast")]
#[command(about = "Clean, rank and publish player predictions", long_about = None)]
struct Cli {
    /// Prediction dump (CSV or JSON). Defaults to the newest predictions_*.csv,
    /// then predictions.csv
    input: Option<PathBuf>,

    /// Backend override: supabase, webhook, file or sqlite
    #[arg(short, long)]
    backend: Option<String>,

    /// Directory holding config/ and defaults/
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Run the pipeline without publishing
    #[arg(long)]
    dry_run: bool,

    /// Number of processed records to print
    #[arg(long, default_value = "3")]
    preview: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let overrides = cli_overrides(&cli, Overrides::from_env());
    let config =
        config::load_config_in(&cli.config_dir, &overrides).context("failed to load configuration")?;
    info!("Publishing via {}", config.publish.backend);

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let input_path = input::resolve_input(cli.input.as_deref(), &cwd);
    let batch = input::load_batch(&input_path)
        .with_context(|| format!("failed to load {}", input_path.display()))?;
    info!("Loaded {} rows from {}", batch.len(), input_path.display());

    let processed = if cli.dry_run {
        whiteshorts_broadcast::run(batch, &config.pipeline).batch
    } else {
        whiteshorts_publish::publish_results(batch, &config)
            .await
            .context("failed to publish results")?
    };

    println!("{}", preview_json(processed.rows(), cli.preview)?);
    Ok(())
}

/// Command-line flags win over the environment. A dry run publishes
/// nothing, so it falls back to the file backend and skips credential
/// checks unless a backend is named explicitly.
fn cli_overrides(cli: &Cli, mut overrides: Overrides) -> Overrides {
    if let Some(backend) = &cli.backend {
        overrides.backend = Some(backend.clone());
    } else if cli.dry_run && overrides.backend.is_none() {
        overrides.backend = Some("file".into());
    }
    overrides
}

/// Pretty JSON array of the first `n` rows.
fn preview_json(rows: &[Row], n: usize) -> anyhow::Result<String> {
    let shown = &rows[..n.min(rows.len())];
    serde_json::to_string_pretty(shown).context("failed to render preview")
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose {
        "whiteshorts=debug,warn"
    } else {
        "whiteshorts=info,warn"
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
