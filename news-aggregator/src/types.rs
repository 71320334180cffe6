use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
// Use the interfaces crate for core types
pub use interfaces::defs::{CanonicalItem, ClickRecord, Clock, SourceConfig, SourceKind, SystemClock};
pub use interfaces::state::{KeyValueStore, MemoryStore, SqliteStore};

/// Store keys, one per persisted section.
pub mod keys {
    pub const CLICKS: &str = "news.clicks";
    pub const ORDER: &str = "news.order";
    pub const SOURCES: &str = "news.sources";
    pub const LAST_REFRESH: &str = "news.last_refresh";
    pub const BOOKMARKS: &str = "news.bookmarks";
    pub const DISPLAY_NAME: &str = "news.display_name";

    pub const ALL: [&str; 6] = [CLICKS, ORDER, SOURCES, LAST_REFRESH, BOOKMARKS, DISPLAY_NAME];
}

pub const DEFAULT_INTERMEDIARIES: [&str; 4] = [
    "https://api.allorigins.win/get?url=",
    "https://corsproxy.io/?",
    "https://cors-anywhere.herokuapp.com/",
    "https://api.allorigins.win/raw?url=",
];

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub user_agent: String,
    /// Relay prefixes tried in order for syndication sources; the
    /// percent-encoded feed URL is appended to each.
    pub intermediaries: Vec<String>,
    pub syndication_timeout_seconds: u64,
    pub json_timeout_seconds: u64,
    pub refresh_interval_minutes: i64,
    pub max_items: usize,
    /// Batches smaller than this are flagged as sparse.
    pub sparse_threshold: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            user_agent: "Top20-News-Aggregator/1.0".to_string(),
            intermediaries: DEFAULT_INTERMEDIARIES.iter().map(|s| s.to_string()).collect(),
            syndication_timeout_seconds: 10,
            json_timeout_seconds: 15,
            refresh_interval_minutes: 30,
            max_items: 20,
            sparse_threshold: 5,
        }
    }
}

impl AggregatorConfig {
    /// Defaults overridden by `NEWS_*` environment variables where present.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(agent) = env::var("NEWS_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(minutes) = env::var("NEWS_REFRESH_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.refresh_interval_minutes = minutes;
        }
        if let Some(max_items) = env::var("NEWS_MAX_ITEMS").ok().and_then(|v| v.parse().ok()) {
            config.max_items = max_items;
        }
        if let Ok(list) = env::var("NEWS_INTERMEDIARIES") {
            let intermediaries: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !intermediaries.is_empty() {
                config.intermediaries = intermediaries;
            }
        }

        config
    }
}

/// A response body accepted from one fetch attempt, after envelope unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub kind: SourceKind,
    pub body: String,
}

/// Outcome of fetching and parsing a single source within one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source_id: String,
    pub source_name: String,
    pub success: bool,
    pub items_found: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BatchCondition {
    Complete,
    /// Usable, but fewer items than the sparse threshold survived.
    Sparse { count: usize },
    /// No source enabled, or every enabled source failed.
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub items: Vec<CanonicalItem>,
    pub reports: Vec<SourceReport>,
    pub condition: BatchCondition,
    pub refreshed_at: DateTime<Utc>,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.reports.iter().filter(|r| !r.success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Idle,
    Loading,
    Success,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("Source {source_name} unreachable: {last_error}")]
    SourceUnreachable { source_name: String, last_error: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Unable to load news: no source produced any items")]
    EmptyBatch,

    #[error("Import document malformed: {0}")]
    ImportMalformed(String),

    #[error("Invalid source {id}: {reason}")]
    InvalidSource { id: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
