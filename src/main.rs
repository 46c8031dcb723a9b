use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

use paginationable::config::Config;
use paginationable::logging::init_tracing;
use paginationable::{
    FetchOutcome, FetchRequest, FileStateStore, HttpTransport, PaginationCoordinator, StateStore,
};

#[derive(Parser, Debug)]
#[command(name = "paginationable", version, about = "Fetch one page of a paginated endpoint")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Endpoint to fetch, overriding the config
    #[arg(long)]
    endpoint: Option<String>,

    /// Base URL, overriding the config
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    page: Option<u32>,

    #[arg(long)]
    per_page: Option<u32>,

    /// Search term; switches to search mode
    #[arg(long)]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(endpoint) = cli.endpoint {
        config.coordinator.endpoint = endpoint;
    }
    if let Some(base_url) = cli.base_url {
        config.transport.base_url = base_url;
    }
    config.validate()?;

    let transport = HttpTransport::new(&config.transport).context("Failed to build HTTP client")?;
    let mut builder = PaginationCoordinator::<Value>::builder(config.coordinator.clone(), Arc::new(transport))
        .with_json_mapper();
    if config.coordinator.persisted {
        let store: Arc<dyn StateStore<Value>> =
            Arc::new(FileStateStore::new(config.persistence.resolved_dir()));
        builder = builder.store(store);
    }
    let coordinator = builder.build()?;

    let mut request = FetchRequest::new();
    if let Some(page) = cli.page {
        request = request.page(page);
    }
    if let Some(per_page) = cli.per_page {
        request = request.per_page(per_page);
    }

    // Committing a search term fetches its first page; only fetch again when
    // the caller asked for something else.
    let outcome = match cli.search.filter(|term| !term.is_empty()) {
        Some(term) if request == FetchRequest::new() => coordinator.commit_search_term(term).await,
        Some(term) => match coordinator.commit_search_term(term).await {
            Ok(_) => coordinator.fetch(request).await,
            Err(e) => Err(e),
        },
        None => coordinator.fetch(request).await,
    };

    match outcome {
        Ok(FetchOutcome::Cached { key }) => tracing::info!(key = %key, "Served from cache"),
        Ok(_) => {}
        Err(e) => {
            if let Some(response) = e.response() {
                eprintln!("{}", serde_json::to_string_pretty(response)?);
            }
            coordinator.teardown()?;
            return Err(e.into());
        }
    }

    println!("{}", serde_json::to_string_pretty(&coordinator.provider().snapshot())?);
    coordinator.teardown()?;
    Ok(())
}
