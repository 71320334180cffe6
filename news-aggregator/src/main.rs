use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use news_aggregator::{
    AggregatorConfig, BatchCondition, NewsAggregator, SourceConfig, SourceKind, SqliteStore,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "news-aggregator")]
#[command(about = "Aggregate, classify and rank news from configured feeds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and rank the current batch
    Refresh {
        /// Ignore the refresh interval
        #[arg(short, long)]
        force: bool,

        /// Print the batch as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a click on an item
    Click { id: String },

    /// Add or remove a bookmark
    Bookmark { id: String },

    /// List bookmarked ids
    Bookmarks,

    /// List configured sources
    Sources,

    /// Add a source
    AddSource {
        #[arg(long)]
        name: String,

        #[arg(long)]
        url: String,

        #[arg(long, value_enum, default_value_t = KindArg::Rss)]
        kind: KindArg,

        /// Defaults to a generated id
        #[arg(long)]
        id: Option<String>,
    },

    /// Enable or disable a source
    ToggleSource { id: String },

    /// Write all persisted state as JSON
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace persisted sections from an export document
    Import { file: PathBuf },

    /// Remove all persisted state
    Reset,

    /// Show or set the display name
    Name { name: Option<String> },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Rss,
    Json,
}

impl From<KindArg> for SourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Rss => SourceKind::Rss,
            KindArg::Json => SourceKind::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://news.db".to_string());
    info!("Opening state store: {}", database_url);
    let store = SqliteStore::connect(&database_url)
        .await
        .with_context(|| format!("failed to open {}", database_url))?;

    let aggregator = NewsAggregator::new(Arc::new(store), AggregatorConfig::from_env())?;

    match cli.command {
        Commands::Refresh { force, json } => refresh(&aggregator, force, json).await?,
        Commands::Click { id } => {
            let record = aggregator.record_click(&id).await?;
            println!("{} clicked {} time(s)", id, record.count);
        }
        Commands::Bookmark { id } => {
            let added = aggregator.toggle_bookmark(&id).await?;
            println!("{} {}", if added { "Bookmarked" } else { "Removed bookmark" }, id);
        }
        Commands::Bookmarks => {
            for id in aggregator.bookmarks().await? {
                println!("{}", id);
            }
        }
        Commands::Sources => {
            for source in aggregator.sources().await? {
                let marker = if source.enabled { "x" } else { " " };
                println!("[{}] {:<16} {:<5} {}", marker, source.id, source.kind.as_str(), source.url);
            }
        }
        Commands::AddSource { name, url, kind, id } => {
            let id = id.unwrap_or_else(|| format!("custom-{}", uuid::Uuid::new_v4().simple()));
            aggregator
                .add_source(SourceConfig::new(&id, &name, &url, kind.into()))
                .await?;
            println!("Added source {}", id);
        }
        Commands::ToggleSource { id } => {
            let enabled = aggregator.toggle_source(&id).await?;
            println!("{} {}", id, if enabled { "enabled" } else { "disabled" });
        }
        Commands::Export { output } => {
            let document = serde_json::to_string_pretty(&aggregator.export_state().await?)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, document).await?;
                    info!("Exported state to {}", path.display());
                }
                None => println!("{}", document),
            }
        }
        Commands::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let document: serde_json::Value =
                serde_json::from_str(&raw).context("import file is not valid JSON")?;
            aggregator.import_state(&document).await?;
            println!("Imported {}", file.display());
        }
        Commands::Reset => {
            aggregator.reset_state().await?;
            println!("State cleared");
        }
        Commands::Name { name: Some(name) } => {
            aggregator.set_display_name(&name).await?;
            println!("{}", aggregator.display_name().await?);
        }
        Commands::Name { name: None } => println!("{}", aggregator.display_name().await?),
    }

    Ok(())
}

async fn refresh(aggregator: &NewsAggregator, force: bool, json: bool) -> Result<()> {
    let batch = aggregator.aggregate(force).await?;

    for report in batch.failed_sources() {
        warn!(
            "{} failed: {}",
            report.source_name,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(batch.as_ref())?);
        return Ok(());
    }

    match batch.condition {
        BatchCondition::Empty => {
            println!("Unable to load news. Check your connection or enable more sources.");
            return Ok(());
        }
        BatchCondition::Sparse { count } => {
            println!("Only {} stories available right now.", count);
        }
        BatchCondition::Complete => {}
    }

    let name = aggregator.display_name().await?;
    println!("Top stories for {} ({})", name, batch.refreshed_at.format("%Y-%m-%d %H:%M UTC"));
    for (rank, item) in batch.items.iter().enumerate() {
        let category = item.category.as_deref().unwrap_or("general");
        let bookmark = if aggregator.is_bookmarked(&item.id).await? { "*" } else { " " };
        println!("{:>2}.{} [{}] {} ({})", rank + 1, bookmark, category, item.title, item.source);
        if !item.locations.is_empty() {
            println!("     {}", item.locations.join(", "));
        }
        println!("     {}", item.link);
    }

    Ok(())
}
