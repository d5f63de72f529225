use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::TryStreamExt;
use medcrawler::config::{find_config_file, load_config};
use medcrawler::{Crawler, CrawlerConfig, SearchQuery, SourceAdapter};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MedCrawler - Search and fetch metadata from medical literature APIs
#[derive(Parser, Debug)]
#[command(name = "medcrawler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search PubMed and ClinicalTrials.gov and fetch structured metadata", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Contact email sent to providers that accept one
    #[arg(long, global = true)]
    email: Option<String>,

    /// API key sent to providers that accept one
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Disable the response cache
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query PubMed through NCBI E-utilities
    #[cfg(feature = "source-pubmed")]
    #[command(alias = "pm")]
    Pubmed {
        #[command(subcommand)]
        action: Action,
    },

    /// Query the ClinicalTrials.gov v2 API
    #[cfg(feature = "source-clinical-trials")]
    #[command(alias = "ct")]
    ClinicalTrials {
        #[command(subcommand)]
        action: Action,
    },
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Search for identifiers matching a query
    #[command(alias = "s")]
    Search {
        /// Search query string
        query: String,

        /// Maximum number of identifiers to return
        #[arg(long, short)]
        max_results: Option<usize>,

        /// Lower date bound (PubMed: YYYY/MM/DD, ClinicalTrials.gov: YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Upper date bound (PubMed: YYYY/MM/DD, ClinicalTrials.gov: YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Identifier to leave out of the results (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Fetch metadata for one identifier
    #[command(alias = "g")]
    Get {
        /// PMID or NCT ID
        id: String,
    },

    /// Fetch metadata for several identifiers
    #[command(alias = "b")]
    Batch {
        /// PMIDs or NCT IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Search, then fetch metadata for every hit
    Demo {
        /// Search query string
        query: String,

        /// Maximum number of items
        #[arg(long, short, default_value_t = 5)]
        max_results: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("medcrawler={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = build_config(&cli)?;

    let work = dispatch(cli.command, config);

    // Dropping the work future on Ctrl-C cancels in-flight requests and closes the session
    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
            Ok(())
        }
    }
}

/// Load configuration from file and environment, then apply command-line overrides
fn build_config(cli: &Cli) -> Result<CrawlerConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => find_config_file(),
    };
    if let Some(path) = &path {
        tracing::info!("Using config file: {}", path.display());
    }

    let mut config = load_config(path.as_deref()).context("failed to load configuration")?;

    if let Some(email) = &cli.email {
        config = config.with_contact_email(email);
    }
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key);
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_request_timeout(Duration::from_secs(timeout));
    }
    if cli.no_cache {
        config = config.with_cache_ttl(Duration::ZERO);
    }

    config.validate()?;
    Ok(config)
}

async fn dispatch(command: Commands, config: CrawlerConfig) -> Result<()> {
    match command {
        #[cfg(feature = "source-pubmed")]
        Commands::Pubmed { action } => run(Crawler::pubmed(config)?, action).await,
        #[cfg(feature = "source-clinical-trials")]
        Commands::ClinicalTrials { action } => run(Crawler::clinical_trials(config)?, action).await,
    }
}

async fn run<A: SourceAdapter>(crawler: Crawler<A>, action: Action) -> Result<()> {
    match action {
        Action::Search {
            query,
            max_results,
            from,
            to,
            exclude,
        } => {
            let mut search = SearchQuery::new(query).exclude(exclude);
            search.max_results = max_results;
            search.from_date = from;
            search.to_date = to;

            let ids: Vec<String> = crawler.search(search).try_collect().await?;
            tracing::info!("Found {} identifiers", ids.len());
            print_json(&ids)?;
        }
        Action::Get { id } => {
            let item = crawler
                .get_item(&id)
                .await
                .with_context(|| format!("failed to fetch {}", id))?;
            print_json(&item)?;
        }
        Action::Batch { ids } => {
            let result = crawler.get_items_batch(ids).await;
            print_json(&result)?;
        }
        Action::Demo { query, max_results } => {
            let ids: Vec<String> = crawler
                .search(SearchQuery::new(query.as_str()).max_results(max_results))
                .try_collect()
                .await?;
            tracing::info!(
                "Found {} identifiers in {}, fetching metadata",
                ids.len(),
                crawler.adapter().name()
            );

            let result = crawler.get_items_batch(ids.iter().cloned()).await;
            let items: Vec<_> = ids.iter().filter_map(|id| result.items.get(id)).collect();

            print_json(&serde_json::json!({
                "source": crawler.adapter().id(),
                "query": query,
                "ids": ids,
                "items": items,
                "failures": result.failures,
            }))?;
        }
    }

    crawler.close();
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
