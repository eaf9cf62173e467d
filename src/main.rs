use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use listen_stats::bench::{run_matrix, BenchMatrix};
use listen_stats::config::{init_config, Config};
use listen_stats::display::DisplayManager;
use listen_stats::loader::{load_events, parse_date, DateWindow};
use listen_stats::logging::init_logging;
use listen_stats::report::finalize_with;
use listen_stats::scheduler::{
    BatchAnalyzer, BatchScheduler, LocalAnalyzer, SchedulePolicy, SchedulerOptions,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "listen-stats")]
#[command(about = "Batched listening-history statistics for exported streaming history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Scheduling flags shared by `analyze` and `bench`
#[derive(clap::Args, Debug, Clone, Default)]
struct SchedulingArgs {
    /// Scheduling policy: sliding or fixed
    #[arg(long)]
    policy: Option<SchedulePolicy>,
    /// Aggregation endpoint URL; batches are analyzed in-process when omitted
    #[arg(long)]
    endpoint: Option<String>,
    /// Per-call timeout in seconds (0 disables it)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze listening history files
    Analyze {
        /// History files, directories or glob patterns
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Maximum batches in flight
        #[arg(long)]
        concurrency: Option<usize>,
        #[command(flatten)]
        scheduling: SchedulingArgs,
        /// Start date filter (YYYY-MM-DD, inclusive)
        #[arg(long)]
        since: Option<String>,
        /// End date filter (YYYY-MM-DD, inclusive)
        #[arg(long)]
        until: Option<String>,
        /// Length of ranked lists
        #[arg(long)]
        top: Option<usize>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Do not draw progress
        #[arg(long, short)]
        quiet: bool,
    },
    /// Serve the aggregation endpoint
    Serve {
        /// Address to bind, e.g. 127.0.0.1:3000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Measure throughput across batch sizes and concurrency levels
    Bench {
        /// History files, directories or glob patterns
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Comma-separated batch sizes
        #[arg(long, value_delimiter = ',', default_value = "500,1000,2000,5000")]
        batch_sizes: Vec<usize>,
        /// Comma-separated concurrency levels
        #[arg(long, value_delimiter = ',', default_value = "1,2,4,8")]
        concurrency_levels: Vec<usize>,
        #[command(flatten)]
        scheduling: SchedulingArgs,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json_output(&self) -> bool {
        match self {
            Commands::Analyze { json, .. } | Commands::Bench { json, .. } => *json,
            Commands::Serve { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.command.json_output();

    let config = match init_config() {
        Ok(config) => config,
        Err(e) => handle_error(e, json),
    };
    let _log_guard = init_logging(config);
    config.report_loaded();

    if let Err(e) = run(cli.command, config).await {
        handle_error(e, json);
    }
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    let display = DisplayManager::new(config.output.json_pretty);

    match command {
        Commands::Analyze {
            paths,
            batch_size,
            concurrency,
            scheduling,
            since,
            until,
            top,
            json,
            quiet,
        } => {
            let window = DateWindow::new(
                since.as_deref().map(parse_date).transpose()?,
                until.as_deref().map(parse_date).transpose()?,
            )?;
            let events = window.apply(load_events(&paths)?);
            if events.is_empty() {
                bail!("No listening events to analyze");
            }

            let mut options = scheduler_options(config, &scheduling);
            if let Some(size) = batch_size {
                options.batch_size = size;
            }
            if let Some(limit) = concurrency {
                options.max_concurrency = limit;
            }

            let analyzer = select_analyzer(config, &scheduling)?;
            let scheduler = BatchScheduler::new(analyzer, options);
            let show_progress = !json && !quiet;
            let outcome = scheduler
                .execute(&events, |progress| {
                    if show_progress {
                        display.display_progress(progress);
                    }
                })
                .await?;
            debug!(
                batches = outcome.stats.batches,
                elapsed_ms = outcome.stats.elapsed.as_millis() as u64,
                "Analysis finished"
            );

            let report = finalize_with(&outcome.aggregate, top.unwrap_or(config.processing.top_n));
            display.display_report(&report, json)
        }
        Commands::Serve { bind } => {
            let address = bind.unwrap_or_else(|| config.server.bind_address.clone());
            serve(&address).await
        }
        Commands::Bench {
            paths,
            batch_sizes,
            concurrency_levels,
            scheduling,
            json,
        } => {
            let events = load_events(&paths)?;
            if events.is_empty() {
                bail!("No listening events to benchmark");
            }

            let options = scheduler_options(config, &scheduling);
            let matrix = BenchMatrix {
                batch_sizes,
                concurrency_levels,
                policy: options.policy,
                call_timeout: options.call_timeout,
            };
            info!(cells = matrix.cells().count(), records = events.len(), "Running benchmark");

            let analyzer = select_analyzer(config, &scheduling)?;
            let results = run_matrix(analyzer, &events, &matrix).await?;
            display.display_bench(&results, json)
        }
    }
}

/// Configured options with command-line overrides applied
fn scheduler_options(config: &Config, args: &SchedulingArgs) -> SchedulerOptions {
    let mut options = SchedulerOptions::from(&config.processing);
    if let Some(policy) = args.policy {
        options.policy = policy;
    }
    if let Some(secs) = args.timeout_secs {
        options.call_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    options
}

fn select_analyzer(config: &Config, args: &SchedulingArgs) -> Result<Arc<dyn BatchAnalyzer>> {
    let endpoint = args.endpoint.clone().or_else(|| config.remote.endpoint.clone());
    match endpoint {
        Some(url) => remote_analyzer(url),
        None => Ok(Arc::new(LocalAnalyzer)),
    }
}

#[cfg(feature = "remote")]
fn remote_analyzer(url: String) -> Result<Arc<dyn BatchAnalyzer>> {
    let analyzer = listen_stats::remote::RemoteAnalyzer::new(url);
    info!(endpoint = analyzer.endpoint(), "Submitting batches to remote endpoint");
    Ok(Arc::new(analyzer))
}

#[cfg(not(feature = "remote"))]
fn remote_analyzer(url: String) -> Result<Arc<dyn BatchAnalyzer>> {
    bail!("Cannot use endpoint {url}: built without the `remote` feature")
}

#[cfg(feature = "server")]
async fn serve(address: &str) -> Result<()> {
    listen_stats::endpoint::serve(address)
        .await
        .context("Aggregation endpoint stopped with an error")
}

#[cfg(not(feature = "server"))]
async fn serve(_address: &str) -> Result<()> {
    bail!("Built without the `server` feature")
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
    } else {
        eprintln!("❌ Error: {e:#}");
    }
    process::exit(1);
}
