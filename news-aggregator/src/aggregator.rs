use crate::classifier::Classifier;
use crate::dedup::deduplicate;
use crate::feed_manager::SourceManager;
use crate::fetcher::Fetcher;
use crate::parser::FeedParser;
use crate::personalization::PersonalizationRanker;
use crate::state::StateManager;
use crate::traits::{HttpTransport, PlaceExtractor};
use crate::types::{
    AggregatorConfig, AggregatorError, Aggregation, BatchCondition, CanonicalItem, ClickRecord,
    Clock, KeyValueStore, RefreshStatus, Result, SourceConfig, SourceReport, SystemClock,
};
use crate::utils::time::should_refresh;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub const UNABLE_TO_LOAD: &str = "unable to load";

/// Composes fetching, parsing, dedup, classification and ranking into one
/// refresh, and fronts the persisted user state.
pub struct NewsAggregator {
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
    fetcher: Arc<Fetcher>,
    parser: Arc<FeedParser>,
    classifier: Arc<Classifier>,
    ranker: Arc<PersonalizationRanker>,
    sources: Arc<SourceManager>,
    state: Arc<StateManager>,
    latest: RwLock<Option<Arc<Aggregation>>>,
    status: RwLock<RefreshStatus>,
    refresh_lock: Mutex<()>,
}

impl NewsAggregator {
    /// Production wiring: `reqwest` transport and the system clock.
    pub fn new(store: Arc<dyn KeyValueStore>, config: AggregatorConfig) -> Result<Self> {
        let fetcher = Fetcher::new(config.clone())?;
        Ok(Self::assemble(store, config, fetcher, Arc::new(SystemClock)))
    }

    pub fn with_components(
        store: Arc<dyn KeyValueStore>,
        config: AggregatorConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fetcher = Fetcher::with_transport(config.clone(), transport);
        Self::assemble(store, config, fetcher, clock)
    }

    /// Swap the default place extractor.
    pub fn with_place_extractor(mut self, extractor: Arc<dyn PlaceExtractor>) -> Self {
        self.classifier = Arc::new(Classifier::new(extractor));
        self
    }

    fn assemble(
        store: Arc<dyn KeyValueStore>,
        config: AggregatorConfig,
        fetcher: Fetcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            parser: Arc::new(FeedParser::new(clock.clone())),
            classifier: Arc::new(Classifier::default()),
            ranker: Arc::new(PersonalizationRanker::new(store.clone(), clock.clone())),
            sources: Arc::new(SourceManager::new(store.clone())),
            state: Arc::new(StateManager::new(store, clock.clone())),
            latest: RwLock::new(None),
            status: RwLock::new(RefreshStatus::Idle),
            refresh_lock: Mutex::new(()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub async fn status(&self) -> RefreshStatus {
        self.status.read().await.clone()
    }

    /// The most recent non-empty batch, if one is held.
    pub async fn latest(&self) -> Option<Arc<Aggregation>> {
        self.latest.read().await.clone()
    }

    /// Refresh unless `force` is false and the last refresh is recent enough,
    /// in which case the held batch is returned as is.
    pub async fn aggregate(&self, force: bool) -> Result<Arc<Aggregation>> {
        let _refresh = self.refresh_lock.lock().await;

        if !force {
            let last_refresh = self.state.last_refresh().await?;
            if !should_refresh(last_refresh, self.clock.now(), self.config.refresh_interval_minutes) {
                if let Some(latest) = self.latest().await {
                    debug!("Within refresh interval, reusing batch from {}", latest.refreshed_at);
                    return Ok(latest);
                }
            }
        }

        self.set_status(RefreshStatus::Loading).await;
        match self.refresh().await {
            Ok(aggregation) => Ok(aggregation),
            Err(e) => {
                error!("Refresh failed: {}", e);
                self.set_status(RefreshStatus::Error(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn refresh(&self) -> Result<Arc<Aggregation>> {
        let sources = self.sources.enabled_sources().await?;
        if sources.is_empty() {
            warn!("No enabled sources");
        }
        info!("Aggregating news from {} sources", sources.len());

        let outcomes = join_all(sources.iter().map(|source| self.collect_source(source))).await;

        let mut reports = Vec::with_capacity(sources.len());
        let mut collected = Vec::new();
        for (source, outcome) in sources.iter().zip(outcomes) {
            let report = match outcome {
                Ok(items) => {
                    debug!("{}: {} items", source.name, items.len());
                    let report = SourceReport {
                        source_id: source.id.clone(),
                        source_name: source.name.clone(),
                        success: true,
                        items_found: items.len(),
                        error: None,
                    };
                    collected.extend(items);
                    report
                }
                Err(e) => {
                    warn!("Source {} failed: {}", source.name, e);
                    SourceReport {
                        source_id: source.id.clone(),
                        source_name: source.name.clone(),
                        success: false,
                        items_found: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        let succeeded = reports.iter().filter(|r| r.success).count();
        info!("Successfully fetched {}/{} sources", succeeded, reports.len());

        let refreshed_at = self.clock.now();
        if collected.is_empty() {
            error!("{}", AggregatorError::EmptyBatch);
            self.set_status(RefreshStatus::Error(UNABLE_TO_LOAD.to_string())).await;
            return Ok(Arc::new(Aggregation {
                items: Vec::new(),
                reports,
                condition: BatchCondition::Empty,
                refreshed_at,
            }));
        }

        let mut items = deduplicate(collected);
        items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
        items.truncate(self.config.max_items);
        let items = self.classifier.classify_all(items);

        // Ranked under the write guard so a click landing mid-refresh either
        // shows up in this ranking or re-ranks the stored batch afterwards.
        let mut latest = self.latest.write().await;
        let items = self.ranker.rank(items).await?;

        let condition = if items.len() < self.config.sparse_threshold {
            warn!("Only {} items available", items.len());
            BatchCondition::Sparse { count: items.len() }
        } else {
            BatchCondition::Complete
        };

        self.state.set_last_refresh(refreshed_at).await?;

        let aggregation = Arc::new(Aggregation {
            items,
            reports,
            condition,
            refreshed_at,
        });
        *latest = Some(aggregation.clone());
        drop(latest);
        self.set_status(RefreshStatus::Success).await;

        info!("Aggregated {} items", aggregation.items.len());
        Ok(aggregation)
    }

    /// Fetch and parse one source. A payload that parses to nothing is
    /// rejected so the next intermediary gets a chance.
    async fn collect_source(&self, source: &SourceConfig) -> Result<Vec<CanonicalItem>> {
        let parser = &self.parser;
        self.fetcher
            .fetch_with(source, |payload| {
                let items = parser.parse(&payload, &source.name)?;
                if items.is_empty() {
                    return Err(AggregatorError::MalformedPayload(
                        "payload contained no usable items".to_string(),
                    ));
                }
                Ok(items)
            })
            .await
    }

    async fn set_status(&self, status: RefreshStatus) {
        *self.status.write().await = status;
    }

    /// Record a click and re-rank the held batch to match.
    pub async fn record_click(&self, id: &str) -> Result<ClickRecord> {
        let record = self.ranker.record_click(id).await?;

        let mut latest = self.latest.write().await;
        if let Some(current) = latest.clone() {
            let items = self.ranker.rank(current.items.clone()).await?;
            *latest = Some(Arc::new(Aggregation {
                items,
                reports: current.reports.clone(),
                condition: current.condition,
                refreshed_at: current.refreshed_at,
            }));
        }

        Ok(record)
    }

    pub async fn click_count(&self, id: &str) -> Result<u64> {
        self.ranker.click_count(id).await
    }

    pub async fn toggle_bookmark(&self, id: &str) -> Result<bool> {
        self.state.toggle_bookmark(id).await
    }

    pub async fn bookmarks(&self) -> Result<Vec<String>> {
        self.state.bookmarks().await
    }

    pub async fn is_bookmarked(&self, id: &str) -> Result<bool> {
        self.state.is_bookmarked(id).await
    }

    pub async fn export_state(&self) -> Result<Value> {
        self.state.export_state().await
    }

    /// Imported sections replace persisted ones; the held batch is dropped
    /// since its ranking may no longer match.
    pub async fn import_state(&self, document: &Value) -> Result<()> {
        let _history = self.ranker.lock_history().await;
        self.state.import_state(document).await?;
        *self.latest.write().await = None;
        Ok(())
    }

    /// Clears every section. Clicks recorded concurrently land wholly before
    /// or wholly after the reset.
    pub async fn reset_state(&self) -> Result<()> {
        let _history = self.ranker.lock_history().await;
        self.state.reset_state().await?;
        *self.latest.write().await = None;
        self.set_status(RefreshStatus::Idle).await;
        Ok(())
    }

    pub async fn sources(&self) -> Result<Vec<SourceConfig>> {
        self.sources.sources().await
    }

    pub async fn update_sources(&self, sources: Vec<SourceConfig>) -> Result<()> {
        self.sources.update_sources(sources).await
    }

    pub async fn add_source(&self, source: SourceConfig) -> Result<()> {
        self.sources.add_source(source).await
    }

    pub async fn toggle_source(&self, id: &str) -> Result<bool> {
        self.sources.toggle_source(id).await
    }

    pub async fn display_name(&self) -> Result<String> {
        self.state.display_name().await
    }

    pub async fn set_display_name(&self, name: &str) -> Result<()> {
        self.state.set_display_name(name).await
    }
}
