//! rustlitreview - Semantic Scholar literature feed
//!
//! Meant to be started by a scheduler (cron, systemd timer). Each invocation
//! performs a single run and exits; a run that stops early because of the
//! search API still exits successfully.
//!
//! ## Usage
//!
//! ```bash
//! rustlitreview run --keyword "LLM Safety" --workbook ./feed
//! rustlitreview columns --workbook ./feed --sheet Sheet1
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustlitreview::{
    columns::build_column_map,
    config::{RunConfig, DEFAULT_API_URL},
    csv_store::{default_workbook_dir, CsvWorkbook},
    fetch::HttpTransport,
    runner::Runner,
    store::Workbook,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Semantic Scholar literature feed
#[derive(Parser)]
#[command(name = "rustlitreview")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new papers and append them to the sheet (default)
    Run(RunArgs),

    /// Print the column map of a sheet
    Columns {
        /// Workbook directory
        #[arg(long)]
        workbook: Option<PathBuf>,

        /// Sheet name
        #[arg(long, default_value = "Sheet1")]
        sheet: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Workbook directory (one CSV file per sheet)
    #[arg(long)]
    workbook: Option<PathBuf>,

    /// Target sheet name
    #[arg(long, default_value = "Sheet1")]
    sheet: String,

    /// Search keywords
    #[arg(long, default_value = "LLM Safety")]
    keyword: String,

    /// Include papers without an open access PDF
    #[arg(long)]
    include_closed: bool,

    /// Maximum rows appended per run
    #[arg(long, default_value = "15")]
    limit: usize,

    /// Papers published in the past N months
    #[arg(long, default_value = "10")]
    months: u32,

    /// Fetch attempts, including the first
    #[arg(long, default_value = "5")]
    retries: u32,

    /// Backoff factor in seconds (delay = factor * 2^(attempt-1))
    #[arg(long, default_value = "1.0")]
    backoff: f64,

    /// Search endpoint
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Semantic Scholar API key
    #[arg(long, env = "SEMANTIC_SCHOLAR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,
}

impl Default for RunArgs {
    fn default() -> Self {
        let config = RunConfig::default();
        Self {
            workbook: None,
            sheet: config.sheet_name,
            keyword: config.search_keyword,
            include_closed: !config.open_access_only,
            limit: config.limit_per_run,
            months: config.published_past_months,
            retries: config.retry_count,
            backoff: config.backoff_factor_seconds,
            api_url: config.api_url,
            api_key: std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
            timeout: config.request_timeout.as_secs(),
        }
    }
}

impl RunArgs {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            sheet_name: self.sheet.clone(),
            search_keyword: self.keyword.clone(),
            open_access_only: !self.include_closed,
            limit_per_run: self.limit,
            published_past_months: self.months,
            retry_count: self.retries,
            backoff_factor_seconds: self.backoff,
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_secs(self.timeout),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Some(Commands::Run(args)) => run_feed(args).await,
        None => run_feed(RunArgs::default()).await,
        Some(Commands::Columns { workbook, sheet }) => show_columns(workbook, &sheet),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_feed(args: RunArgs) -> Result<()> {
    let config = args.to_config();
    config.validate().context("Invalid run configuration")?;

    let dir = args.workbook.unwrap_or_else(default_workbook_dir);
    let mut workbook = CsvWorkbook::open(&dir)
        .with_context(|| format!("Failed to open workbook at {}", dir.display()))?;
    let transport = HttpTransport::from_config(&config).context("Failed to build HTTP client")?;

    let summary = Runner::new(config, transport)
        .run(&mut workbook)
        .await
        .context("Run failed")?;

    match &summary.abort {
        Some(reason) => warn!(
            reason = %reason,
            fetched = summary.fetched,
            duplicates = summary.skipped_duplicates,
            "Run ended without appending"
        ),
        None => info!(
            appended = summary.appended,
            start_row = summary.start_row,
            duplicates = summary.skipped_duplicates,
            missing_title = summary.skipped_missing_title,
            failed = summary.failed_items,
            "Run complete"
        ),
    }
    Ok(())
}

fn show_columns(workbook: Option<PathBuf>, sheet: &str) -> Result<()> {
    let dir = workbook.unwrap_or_else(default_workbook_dir);
    let mut workbook = CsvWorkbook::open(&dir)
        .with_context(|| format!("Failed to open workbook at {}", dir.display()))?;

    let Some(sheet) = workbook
        .sheet_mut(sheet)
        .with_context(|| format!("Failed to read sheet {}", sheet))?
    else {
        anyhow::bail!("Sheet {} not found in {}", sheet, dir.display());
    };

    let columns = build_column_map(&*sheet)?;
    if columns.is_empty() {
        println!("No headers.");
    }
    for (key, column) in columns.iter() {
        println!("{:>3}  {}", column, key);
    }
    Ok(())
}
