use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use crawl_index::config::RouterConfig;
use crawl_index::crawl::DocumentRecord;
use crawl_index::search::{IndexGroup, IndexHandle, SearchRequest};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

/// Inspect and maintain a group of crawl indexes
#[derive(Parser, Debug)]
#[command(name = "crawl-index")]
#[command(about = "Search, optimize and replicate crawl indexes")]
struct Cli {
    /// JSON router configuration
    #[arg(short, long, value_name = "FILE", conflicts_with = "indices")]
    config: Option<PathBuf>,

    /// Comma-separated index names stored under the data directory
    #[arg(short, long, value_name = "NAMES")]
    indices: Option<String>,

    /// Override the data directory
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print per-index and total statistics
    Stats,

    /// Search one index or the whole group
    Search {
        query: String,

        #[arg(long, default_value_t = 0)]
        start: usize,

        #[arg(long, default_value_t = 10)]
        rows: usize,

        #[arg(long)]
        index: Option<String>,
    },

    /// Merge segments of one index or of every index
    Optimize {
        #[arg(long)]
        index: Option<String>,
    },

    /// Print stored documents as crawl records
    Records {
        #[arg(long)]
        index: Option<String>,

        #[arg(long, default_value_t = 10)]
        rows: usize,
    },

    /// Copy the current version of one index or of every index
    Push {
        /// Destination URL or local directory
        destination: String,

        #[arg(long)]
        index: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir);
    }

    let group = IndexGroup::from_config(&config)?;
    info!("Index group '{}' ready: {:?}", config.name, group.names());

    match cli.command {
        Command::Stats => {
            let mut per_index = Vec::new();
            for handle in group.handles() {
                let stats = handle.statistics().await?;
                per_index.push(serde_json::json!({
                    "index": handle.name(),
                    "version": handle.version(),
                    "online": handle.is_online(),
                    "read_only": handle.is_read_only(),
                    "statistics": stats,
                }));
            }
            print_json(&serde_json::json!({
                "indices": per_index,
                "total": group.statistics().await?,
            }))?;
        }
        Command::Search {
            query,
            start,
            rows,
            index,
        } => {
            let request = SearchRequest::new(&query).with_start(start).with_rows(rows);
            let result = match index {
                Some(name) => group.search_index(&name, &request).await?,
                None => group.search(&request).await?,
            };
            print_json(&result)?;
        }
        Command::Optimize { index } => {
            match index {
                Some(name) => group.optimize_index(&name, false).await?,
                None => group.optimize(false).await?,
            }
            info!("Optimize completed");
        }
        Command::Records { index, rows } => {
            let request = SearchRequest::new("").with_rows(rows);
            let result = match index {
                Some(name) => group.search_index(&name, &request).await?,
                None => group.search(&request).await?,
            };

            let mut records = Vec::with_capacity(result.documents.len());
            for document in &result.documents {
                match DocumentRecord::from_index_fields(&document.fields) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(
                        "Skipping document {:?} from '{}': {}",
                        document.fields.get_first("path"),
                        document.index,
                        e
                    ),
                }
            }
            print_json(&records)?;
        }
        Command::Push { destination, index } => {
            let destination = parse_destination(&destination)?;
            group.push_from(index.as_deref(), &destination).await?;
            info!("Push to {} completed", destination);
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<RouterConfig> {
    match (&cli.config, &cli.indices) {
        (Some(path), _) => RouterConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        (None, Some(names)) => {
            RouterConfig::from_index_names(names).context("Invalid --indices value")
        }
        (None, None) => Err(anyhow!("Either --config or --indices is required")),
    }
}

/// Accept a URL, or a plain directory that becomes a `file://` URL
fn parse_destination(destination: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(destination) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = std::path::absolute(destination)
        .with_context(|| format!("Invalid destination {destination}"))?;
    Url::from_directory_path(&path).map_err(|_| anyhow!("Invalid destination {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
