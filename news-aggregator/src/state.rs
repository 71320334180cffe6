use crate::feed_manager::validate_source;
use crate::types::{keys, AggregatorError, ClickRecord, Clock, KeyValueStore, Result, SourceConfig};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_DISPLAY_NAME: &str = "You";

/// Read one JSON-encoded section. A missing key is `None`.
pub(crate) async fn load_section<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub(crate) async fn save_section<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await?;
    Ok(())
}

/// Every persisted section; `None` means absent from the store or document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicks: Option<HashMap<String, ClickRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<DateTime<Utc>>,
    pub sections: StateSections,
}

impl ExportDocument {
    /// Decode and validate an import document without touching any store.
    pub fn from_value(document: &Value) -> Result<Self> {
        if !document.is_object() {
            return Err(AggregatorError::ImportMalformed(
                "document must be a JSON object".to_string(),
            ));
        }

        let parsed: ExportDocument = serde_json::from_value(document.clone())
            .map_err(|e| AggregatorError::ImportMalformed(e.to_string()))?;

        if let Some(sources) = &parsed.sections.sources {
            let mut ids = HashSet::new();
            for source in sources {
                validate_source(source)
                    .map_err(|e| AggregatorError::ImportMalformed(e.to_string()))?;
                if !ids.insert(source.id.as_str()) {
                    return Err(AggregatorError::ImportMalformed(format!(
                        "duplicate source id {}",
                        source.id
                    )));
                }
            }
        }

        let empty_id = |ids: &Option<Vec<String>>| ids.iter().flatten().any(|id| id.is_empty());
        if empty_id(&parsed.sections.order) || empty_id(&parsed.sections.bookmarks) {
            return Err(AggregatorError::ImportMalformed("empty item id".to_string()));
        }

        Ok(parsed)
    }
}

/// Bookmarks, display name, refresh timestamp and whole-state
/// export/import/reset.
pub struct StateManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    bookmark_lock: Mutex<()>,
}

impl StateManager {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            bookmark_lock: Mutex::new(()),
        }
    }

    pub async fn bookmarks(&self) -> Result<Vec<String>> {
        Ok(load_section(self.store.as_ref(), keys::BOOKMARKS).await?.unwrap_or_default())
    }

    pub async fn is_bookmarked(&self, id: &str) -> Result<bool> {
        Ok(self.bookmarks().await?.iter().any(|b| b == id))
    }

    /// Returns `true` when the id was added, `false` when it was removed.
    pub async fn toggle_bookmark(&self, id: &str) -> Result<bool> {
        let _guard = self.bookmark_lock.lock().await;
        let mut bookmarks = self.bookmarks().await?;

        let added = match bookmarks.iter().position(|b| b == id) {
            Some(index) => {
                bookmarks.remove(index);
                false
            }
            None => {
                bookmarks.push(id.to_string());
                true
            }
        };

        save_section(self.store.as_ref(), keys::BOOKMARKS, &bookmarks).await?;
        debug!("Bookmark {} {}", id, if added { "added" } else { "removed" });
        Ok(added)
    }

    pub async fn display_name(&self) -> Result<String> {
        Ok(load_section(self.store.as_ref(), keys::DISPLAY_NAME)
            .await?
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()))
    }

    /// A blank name clears the section so the default applies again.
    pub async fn set_display_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            self.store.remove(keys::DISPLAY_NAME).await?;
        } else {
            save_section(self.store.as_ref(), keys::DISPLAY_NAME, name).await?;
        }
        Ok(())
    }

    pub async fn last_refresh(&self) -> Result<Option<DateTime<Utc>>> {
        load_section(self.store.as_ref(), keys::LAST_REFRESH).await
    }

    pub async fn set_last_refresh(&self, at: DateTime<Utc>) -> Result<()> {
        save_section(self.store.as_ref(), keys::LAST_REFRESH, &at).await
    }

    pub async fn sections(&self) -> Result<StateSections> {
        let store = self.store.as_ref();
        Ok(StateSections {
            clicks: load_section(store, keys::CLICKS).await?,
            order: load_section(store, keys::ORDER).await?,
            sources: load_section(store, keys::SOURCES).await?,
            last_refresh: load_section(store, keys::LAST_REFRESH).await?,
            bookmarks: load_section(store, keys::BOOKMARKS).await?,
            display_name: load_section(store, keys::DISPLAY_NAME).await?,
        })
    }

    pub async fn export_state(&self) -> Result<Value> {
        let document = ExportDocument {
            export_date: Some(self.clock.now()),
            sections: self.sections().await?,
        };
        info!("Exported state");
        Ok(serde_json::to_value(document)?)
    }

    /// Replace the sections present in `document`; absent sections are left
    /// as they are. Nothing is written unless the whole document is valid.
    pub async fn import_state(&self, document: &Value) -> Result<()> {
        let ExportDocument { sections, .. } = ExportDocument::from_value(document)?;
        let store = self.store.as_ref();
        let mut replaced = Vec::new();

        if let Some(clicks) = &sections.clicks {
            save_section(store, keys::CLICKS, clicks).await?;
            replaced.push("clicks");
        }
        if let Some(order) = &sections.order {
            save_section(store, keys::ORDER, order).await?;
            replaced.push("order");
        }
        if let Some(sources) = &sections.sources {
            save_section(store, keys::SOURCES, sources).await?;
            replaced.push("sources");
        }
        if let Some(last_refresh) = &sections.last_refresh {
            save_section(store, keys::LAST_REFRESH, last_refresh).await?;
            replaced.push("lastRefresh");
        }
        if let Some(bookmarks) = &sections.bookmarks {
            save_section(store, keys::BOOKMARKS, bookmarks).await?;
            replaced.push("bookmarks");
        }
        if let Some(name) = &sections.display_name {
            save_section(store, keys::DISPLAY_NAME, name).await?;
            replaced.push("displayName");
        }

        info!("Imported state sections: {:?}", replaced);
        Ok(())
    }

    pub async fn reset_state(&self) -> Result<()> {
        for key in keys::ALL {
            self.store.remove(key).await?;
        }
        info!("Reset all persisted state");
        Ok(())
    }
}
