use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use adharvest::ad_detail::ItemDetailExtractor;
use adharvest::api::create_router;
use adharvest::config::CONFIG;
use adharvest::coordinator::ExtractionCoordinator;
use adharvest::data_models::DetailLevel;
use adharvest::encoding::normalize_to_utf8;
use adharvest::fetcher::HttpFetcher;

#[derive(Parser)]
#[command(name = "adharvest", about = "Extract listings and ads from leboncoin pages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a search results page
    Search {
        url: String,
        /// ids, summaries or full
        #[arg(long, default_value = "summaries")]
        detail: DetailLevel,
        /// Read the results page from a saved file instead of fetching it
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Extract a single ad, by url or by id and category
    Ad {
        url: Option<String>,
        #[arg(long, requires = "category", conflicts_with = "url")]
        id: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Read the ad page from a saved file instead of fetching it
        #[arg(long, requires = "url")]
        html: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // tracing-subscriber also picks up `log` records
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let fetcher = Arc::new(HttpFetcher::from_config()?);
    let coordinator = Arc::new(ExtractionCoordinator::from_config(fetcher)?);

    match cli.command {
        Command::Search { url, detail, html } => {
            let response = match html {
                Some(path) => {
                    let raw = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    coordinator
                        .run_search(&normalize_to_utf8(&raw), &url, detail)
                        .await?
                }
                None => coordinator.search(&url, detail).await?,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Ad {
            url,
            id,
            category,
            html,
        } => {
            let detail = match (url, id, category, html) {
                (Some(url), _, _, Some(path)) => {
                    let raw = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    ItemDetailExtractor::from_config()?.extract(&raw, &url)?
                }
                (Some(url), _, _, None) => coordinator.ad_by_url(&url).await?,
                (None, Some(id), Some(category), _) => coordinator.ad_by_id(&id, &category).await?,
                _ => anyhow::bail!("expected an ad url, or --id with --category"),
            };
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| CONFIG.listen_addr.clone());
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            log::info!("listening on {addr}");
            axum::serve(listener, create_router(coordinator)).await?;
        }
    }
    Ok(())
}
