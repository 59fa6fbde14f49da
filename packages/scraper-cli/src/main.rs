//! Listing Scraper CLI
//!
//! Runs a batch of URLs through fetch, extraction and persistence, writing
//! every artifact into a fresh timestamped folder.

mod config;
mod input;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use listing_extractor::{
    BatchOrchestrator, BatchRequest, BatchStatus, BatchSummary, CostAccountant, CsvSink,
    FanOutSink, Fetcher, FirecrawlFetcher, HttpFetcher, JsonSink, ModelCatalog, PricingTable,
    RapidApiFetcher, SheetsSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Catalog entry used to satisfy the orchestrator in raw-only runs. It needs
/// no credential and is never called.
const RAW_ONLY_MODEL: &str = "Llama3.1 8B";

#[derive(Parser)]
#[command(name = "listing-scraper", version, about = "Extract listings from web pages with LLMs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a batch over a URL file
    Run(RunArgs),
    /// List supported models and their prices
    Models {
        /// JSON pricing file merged over the built-in prices
        #[arg(long)]
        pricing: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// URL file: one URL per line, or URLs in the first column of a .csv
    #[arg(short, long)]
    urls: PathBuf,

    /// Comma-separated fields to extract. Omit to keep raw page text only.
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Model id from `listing-scraper models`
    #[arg(short, long, default_value = "gpt-4o-mini")]
    model: String,

    /// Detect pagination on the first URL
    #[arg(long)]
    pagination: bool,

    /// How the site paginates, in plain words
    #[arg(long, requires = "pagination")]
    pagination_hint: Option<String>,

    /// Also process the discovered page URLs
    #[arg(long, requires = "pagination")]
    merge_pages: bool,

    #[arg(long, value_enum, default_value_t = FetcherChoice::Auto)]
    fetcher: FetcherChoice,

    /// Page load condition for the rapidapi-post fetcher
    #[arg(long, default_value = "domcontentloaded")]
    wait_until: String,

    /// Parent folder for run output (default: SCRAPER_OUTPUT_DIR or ./output)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// URLs fetched and extracted at once
    #[arg(short, long, default_value_t = 1)]
    concurrency: usize,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// JSON pricing file merged over the built-in prices
    #[arg(long)]
    pricing: Option<PathBuf>,

    /// Google Sheets spreadsheet id to append rows to (needs GOOGLE_SHEETS_TOKEN)
    #[arg(long)]
    sheet_id: Option<String>,

    /// Sheet range rows are appended to
    #[arg(long, default_value = "Sheet1")]
    sheet_range: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FetcherChoice {
    /// RapidAPI if RAPIDAPI_KEY is set, then Firecrawl, then plain HTTP
    Auto,
    Http,
    Rapidapi,
    /// POST scrape API (NEW_API_KEY, else RAPIDAPI_KEY)
    RapidapiPost,
    Firecrawl,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,listing_extractor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    // Load .env file if present (development)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Run(args) => run(args, &config).await,
        Command::Models { pricing } => list_models(pricing.as_deref()),
    }
}

async fn run(args: RunArgs, config: &Config) -> Result<()> {
    let urls = input::load_urls(&args.urls)?;
    if urls.is_empty() {
        bail!("No URLs found in {}", args.urls.display());
    }

    let mut request = BatchRequest::new(urls, args.model.clone());
    if !args.fields.is_empty() {
        request = request.with_fields(args.fields.iter().map(|f| f.trim()));
    }
    if args.pagination {
        request = request
            .with_pagination(args.pagination_hint.clone())
            .merge_discovered_urls(args.merge_pages);
    }

    let catalog = ModelCatalog::default();
    let backend_model = if request.needs_model() {
        args.model.as_str()
    } else {
        RAW_ONLY_MODEL
    };
    let backend = catalog
        .backend(backend_model, &config.credentials)
        .with_context(|| format!("Cannot use model '{}'", args.model))?;

    let accountant = CostAccountant::new(pricing_table(args.pricing.as_deref())?);
    let fetcher = build_fetcher(args.fetcher, &args.wait_until, config)?;
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(config.call_timeout);

    let root = args.output_dir.clone().unwrap_or_else(|| config.output_root.clone());
    let run_dir = output::run_dir(
        &root,
        request.urls.first().map(String::as_str),
        chrono::Local::now(),
    );
    let mut sink = FanOutSink::new()
        .with_sink(CsvSink::new(run_dir.join(output::CSV_FILE)))
        .with_sink(JsonSink::new(run_dir.join(output::JSON_FILE)));
    if let Some(sheet_id) = &args.sheet_id {
        let token = config
            .sheets_token
            .clone()
            .context("GOOGLE_SHEETS_TOKEN must be set to write to a spreadsheet")?;
        sink.push(Box::new(
            SheetsSink::new(sheet_id, token).with_range(&args.sheet_range),
        ));
    }

    // Created once configuration is known good
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create {}", run_dir.display()))?;

    let orchestrator = BatchOrchestrator::new(fetcher, backend)
        .with_accountant(accountant)
        .with_concurrency(args.concurrency)
        .with_timeout(timeout);

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current URL");
            token.cancel();
        }
    });

    let mut progress = orchestrator.subscribe();
    let reporter = tokio::spawn(async move {
        let mut printed = 0;
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            if snapshot.processed > printed {
                printed = snapshot.processed;
                let url = snapshot.last_url.as_deref().unwrap_or_default();
                println!(
                    "{} {}",
                    format!("[{}/{}]", snapshot.processed, snapshot.total).bright_black(),
                    url
                );
            }
            if snapshot.status.is_finished() {
                break;
            }
        }
    });

    println!(
        "{} {} URLs with {} into {}",
        "▶".bright_cyan(),
        request.urls.len(),
        args.model.bold(),
        run_dir.display()
    );

    let report = match orchestrator.run(&request, &mut sink).await {
        Ok(report) => report,
        Err(e) => {
            output::discard_if_empty(&run_dir);
            return Err(e).context("Batch could not start");
        }
    };
    drop(orchestrator);
    reporter.await.ok();

    for path in output::write_artifacts(&run_dir, &report.state)? {
        tracing::debug!(path = %path.display(), "Artifact written");
    }

    print_summary(&report.summary(), report.status(), &run_dir);
    if !report.state.failed_urls().is_empty() {
        println!("{}", "Failed URLs:".yellow());
        for url in report.state.failed_urls() {
            println!("  {}", url);
        }
    }

    report
        .into_result()
        .context("Batch halted before all URLs were persisted")?;
    Ok(())
}

fn build_fetcher(
    choice: FetcherChoice,
    wait_until: &str,
    config: &Config,
) -> Result<Arc<dyn Fetcher>> {
    let fetcher: Arc<dyn Fetcher> = match choice {
        FetcherChoice::Auto => match (&config.rapidapi_key, &config.firecrawl_key) {
            (Some(key), _) => Arc::new(RapidApiFetcher::new(key.clone())),
            (None, Some(key)) => Arc::new(FirecrawlFetcher::new(key.clone())),
            (None, None) => Arc::new(HttpFetcher::new()),
        },
        FetcherChoice::Http => Arc::new(HttpFetcher::new()),
        FetcherChoice::Rapidapi => Arc::new(RapidApiFetcher::new(
            config
                .rapidapi_key
                .clone()
                .context("RAPIDAPI_KEY must be set for the rapidapi fetcher")?,
        )),
        FetcherChoice::RapidapiPost => Arc::new(
            RapidApiFetcher::post_api(
                config
                    .scrape_api_key
                    .clone()
                    .context("NEW_API_KEY or RAPIDAPI_KEY must be set for the rapidapi-post fetcher")?,
            )
            .with_wait_until(wait_until),
        ),
        FetcherChoice::Firecrawl => Arc::new(FirecrawlFetcher::new(
            config
                .firecrawl_key
                .clone()
                .context("FIRECRAWL_API_KEY must be set for the firecrawl fetcher")?,
        )),
    };

    tracing::info!(fetcher = fetcher.name(), "Fetcher selected");
    Ok(fetcher)
}

fn pricing_table(path: Option<&Path>) -> Result<PricingTable> {
    let table = PricingTable::default();
    match path {
        Some(path) => {
            let overrides = PricingTable::from_file(path)
                .with_context(|| format!("Failed to load pricing from {}", path.display()))?;
            Ok(table.merge(overrides))
        }
        None => Ok(table),
    }
}

fn list_models(pricing: Option<&Path>) -> Result<()> {
    let table = pricing_table(pricing)?;

    println!(
        "{:<22} {:<20} {:>14} {:>14}",
        "MODEL".bold(),
        "BACKEND".bold(),
        "INPUT $/1M".bold(),
        "OUTPUT $/1M".bold()
    );
    for entry in ModelCatalog::default().entries() {
        let (input, output) = match table.get(&entry.id) {
            Some(price) => (
                format!("{:.3}", price.input * 1_000_000.0),
                format!("{:.3}", price.output * 1_000_000.0),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<22} {:<20} {:>14} {:>14}",
            entry.id,
            format!("{:?}", entry.kind),
            input,
            output
        );
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary, status: &BatchStatus, run_dir: &Path) {
    println!();
    let headline = match status {
        BatchStatus::Completed if summary.cancelled => "■ Batch cancelled".yellow().bold(),
        BatchStatus::Completed => "✓ Batch completed".bright_green().bold(),
        BatchStatus::Halted { .. } => "✗ Batch halted".red().bold(),
        BatchStatus::Idle | BatchStatus::Running => "… Batch unfinished".normal(),
    };
    println!("{}", headline);
    println!(
        "  Processed: {} ({} failed)",
        summary.processed_count,
        summary.failed_count.to_string().yellow()
    );
    println!(
        "  Tokens:    {} in / {} out",
        summary.input_tokens, summary.output_tokens
    );
    println!("  Cost:      ${:.4}", summary.total_cost);
    if let Some(pagination) = &summary.pagination {
        println!("  Pages:     {} discovered", pagination.urls.len());
    }
    println!("  Output:    {}", run_dir.display());
}
