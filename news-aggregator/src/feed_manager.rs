use crate::state::{load_section, save_section};
use crate::types::{keys, AggregatorError, KeyValueStore, Result, SourceConfig, SourceKind};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

const DEFAULT_SOURCES: [(&str, &str, &str); 9] = [
    ("bbc-world", "BBC World News", "http://feeds.bbci.co.uk/news/world/rss.xml"),
    ("guardian-world", "The Guardian World News", "https://www.theguardian.com/world/rss"),
    ("guardian-us", "The Guardian US News", "https://www.theguardian.com/us-news/rss"),
    ("npr-news", "NPR News", "https://feeds.npr.org/1001/rss.xml"),
    ("hackernews", "Hacker News", "https://hnrss.org/frontpage"),
    ("reuters-world", "Reuters World News", "https://feeds.reuters.com/reuters/worldNews"),
    ("thehindu-news", "The Hindu News", "https://www.thehindu.com/feeder/default.rss"),
    ("toi-topstories", "Times of India Top Stories", "https://timesofindia.indiatimes.com/rssfeedstopstories.cms"),
    ("ndtv-india", "NDTV India News", "https://feeds.feedburner.com/ndtvnews-india-news"),
];

/// The source list used when nothing has been persisted yet.
pub fn default_sources() -> Vec<SourceConfig> {
    DEFAULT_SOURCES
        .iter()
        .map(|(id, name, url)| SourceConfig::new(id, name, url, SourceKind::Rss))
        .collect()
}

/// A source needs an id, a name and an absolute http(s) URL with a host.
pub fn validate_source(source: &SourceConfig) -> Result<()> {
    let invalid = |reason: &str| AggregatorError::InvalidSource {
        id: source.id.clone(),
        reason: reason.to_string(),
    };

    if source.id.trim().is_empty() {
        return Err(invalid("empty id"));
    }
    if source.name.trim().is_empty() {
        return Err(invalid("empty name"));
    }

    let parsed = Url::parse(&source.url).map_err(|e| invalid(&format!("bad url: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("url must use http or https"));
    }
    if parsed.host().is_none() {
        return Err(invalid("url has no host"));
    }

    Ok(())
}

fn validate_list(sources: &[SourceConfig]) -> Result<()> {
    let mut ids = HashSet::new();
    for source in sources {
        validate_source(source)?;
        if !ids.insert(source.id.as_str()) {
            return Err(AggregatorError::InvalidSource {
                id: source.id.clone(),
                reason: "duplicate id".to_string(),
            });
        }
    }
    Ok(())
}

pub struct SourceManager {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl SourceManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// The persisted list, seeding the defaults on first use.
    pub async fn sources(&self) -> Result<Vec<SourceConfig>> {
        if let Some(sources) = load_section(self.store.as_ref(), keys::SOURCES).await? {
            return Ok(sources);
        }

        let sources = default_sources();
        save_section(self.store.as_ref(), keys::SOURCES, &sources).await?;
        info!("Seeded {} default sources", sources.len());
        Ok(sources)
    }

    pub async fn enabled_sources(&self) -> Result<Vec<SourceConfig>> {
        Ok(self.sources().await?.into_iter().filter(|s| s.enabled).collect())
    }

    /// Replace the whole list. Rejected without writing if any entry is invalid
    /// or two entries share an id.
    pub async fn update_sources(&self, sources: Vec<SourceConfig>) -> Result<()> {
        validate_list(&sources)?;
        let _guard = self.write_lock.lock().await;
        save_section(self.store.as_ref(), keys::SOURCES, &sources).await?;
        info!("Updated source list ({} sources)", sources.len());
        Ok(())
    }

    pub async fn add_source(&self, source: SourceConfig) -> Result<()> {
        validate_source(&source)?;
        let _guard = self.write_lock.lock().await;
        let mut sources = self.sources().await?;

        if sources.iter().any(|s| s.id == source.id) {
            return Err(AggregatorError::InvalidSource {
                id: source.id,
                reason: "duplicate id".to_string(),
            });
        }
        if sources.iter().any(|s| s.url == source.url) {
            return Err(AggregatorError::InvalidSource {
                id: source.id,
                reason: "url already configured".to_string(),
            });
        }

        info!("Added source {} ({})", source.id, source.url);
        sources.push(source);
        save_section(self.store.as_ref(), keys::SOURCES, &sources).await
    }

    /// Flip `enabled` for `id` and return the new value.
    pub async fn toggle_source(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut sources = self.sources().await?;

        let source = sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AggregatorError::InvalidSource {
                id: id.to_string(),
                reason: "unknown source".to_string(),
            })?;
        source.enabled = !source.enabled;
        let enabled = source.enabled;

        save_section(self.store.as_ref(), keys::SOURCES, &sources).await?;
        debug!("Source {} enabled={}", id, enabled);
        Ok(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_enabled() {
        let sources = default_sources();
        assert_eq!(sources.len(), 9);
        assert!(validate_list(&sources).is_ok());
        assert!(sources.iter().all(|s| s.enabled && s.kind == SourceKind::Rss));
    }

    #[test]
    fn validation_rejects_bad_sources() {
        let bad_scheme = SourceConfig::new("a", "A", "ftp://example.com/feed", SourceKind::Rss);
        assert!(validate_source(&bad_scheme).is_err());

        let relative = SourceConfig::new("a", "A", "/feed.xml", SourceKind::Rss);
        assert!(validate_source(&relative).is_err());

        let no_id = SourceConfig::new(" ", "A", "https://example.com/feed", SourceKind::Json);
        assert!(validate_source(&no_id).is_err());

        let ok = SourceConfig::new("a", "A", "https://example.com/feed", SourceKind::Json);
        let dup = vec![ok.clone(), ok];
        assert!(matches!(
            validate_list(&dup),
            Err(AggregatorError::InvalidSource { reason, .. }) if reason == "duplicate id"
        ));
    }
}
