use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared payload format of a configured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// RSS 2.0 or Atom, retrieved through intermediaries
    Rss,
    /// A JSON document carrying an `articles` array
    Json,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rss => "rss",
            SourceKind::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    pub fn new(id: &str, name: &str, url: &str, kind: SourceKind) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            url: url.to_owned(),
            kind,
            enabled: true,
        }
    }
}

/// The normalized article every source format is mapped into.
///
/// `title` and `link` are never empty: entries lacking either are dropped
/// while parsing. `category` stays `None` and `locations` stays empty until
/// the item has been classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    pub source: String,
    pub category: Option<String>,
    pub locations: Vec<String>,
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRecord {
    pub count: u64,
    pub last_clicked: DateTime<Utc>,
}

/// Source of "now" for publication-date fallbacks, refresh gating and click
/// timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// Persistence is an opaque key-value substrate (see `state::KeyValueStore`):
// every durable section, from click history to the source list, is one JSON
// value under its own key.
