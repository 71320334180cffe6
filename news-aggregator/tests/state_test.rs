mod common;

use async_trait::async_trait;
use common::*;
use futures::future::join_all;
use news_aggregator::{
    default_sources, AggregatorError, KeyValueStore, MemoryStore, NewsAggregator,
    PersonalizationRanker, Result, SourceConfig, SourceKind, SqliteStore, StateManager,
};
use serde_json::json;
use std::sync::Arc;

fn quiet_transport() -> Arc<ScriptedTransport> {
    ScriptedTransport::new(|_| status(404))
}

#[tokio::test]
async fn test_record_click_is_monotonic_and_moves_to_front() -> Result<()> {
    init_tracing();
    let (aggregator, _store) = aggregator(quiet_transport(), TestClock::new());

    assert_eq!(aggregator.click_count("a").await?, 0);
    aggregator.record_click("a").await?;
    aggregator.record_click("b").await?;
    let record = aggregator.record_click("a").await?;

    assert_eq!(record.count, 2);
    assert_eq!(aggregator.click_count("b").await?, 1);

    let exported = aggregator.export_state().await?;
    assert_eq!(exported["sections"]["order"], json!(["a", "b"]));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_clicks_are_all_counted() -> Result<()> {
    init_tracing();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let ranker = PersonalizationRanker::new(store, TestClock::new());

    let results = join_all((0..25).map(|_| ranker.record_click("hot"))).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(ranker.click_count("hot").await?, 25);
    assert_eq!(ranker.order().await?, vec!["hot".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_bookmarks_toggle_in_insertion_order() -> Result<()> {
    init_tracing();
    let (aggregator, _store) = aggregator(quiet_transport(), TestClock::new());

    assert!(aggregator.toggle_bookmark("x").await?);
    assert!(aggregator.toggle_bookmark("y").await?);
    assert!(aggregator.toggle_bookmark("z").await?);
    assert!(!aggregator.toggle_bookmark("y").await?);

    assert_eq!(aggregator.bookmarks().await?, vec!["x".to_string(), "z".to_string()]);
    assert!(aggregator.is_bookmarked("z").await?);
    assert!(!aggregator.is_bookmarked("y").await?);

    // bookmarks are independent of clicks
    assert_eq!(aggregator.click_count("x").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_display_name_defaults_to_you() -> Result<()> {
    init_tracing();
    let (aggregator, _store) = aggregator(quiet_transport(), TestClock::new());

    assert_eq!(aggregator.display_name().await?, "You");
    aggregator.set_display_name("  Ada ").await?;
    assert_eq!(aggregator.display_name().await?, "Ada");
    aggregator.set_display_name("   ").await?;
    assert_eq!(aggregator.display_name().await?, "You");
    Ok(())
}

#[tokio::test]
async fn test_partial_import_leaves_other_sections_alone() -> Result<()> {
    init_tracing();

    let transport = ScriptedTransport::new(|_| {
        ok(rss(&[
            ("a", "Story A", "2024-05-01T11:00:00Z"),
            ("b", "Story B", "2024-05-01T10:00:00Z"),
            ("c", "Story C", "2024-05-01T09:00:00Z"),
            ("d", "Story D", "2024-05-01T08:00:00Z"),
        ]))
    });
    let (aggregator, _store) = aggregator(transport, TestClock::new());
    aggregator
        .update_sources(vec![SourceConfig::new("wire", "Wire", "https://feeds.test/wire.xml", SourceKind::Rss)])
        .await?;

    aggregator.record_click("a").await?;
    aggregator.toggle_bookmark("b").await?;

    aggregator
        .import_state(&json!({
            "exportDate": "2024-05-01T00:00:00Z",
            "sections": {
                "clicks": {
                    "a": { "count": 1, "lastClicked": "2024-05-01T00:00:00Z" },
                    "d": { "count": 3, "lastClicked": "2024-05-01T00:00:00Z" }
                }
            }
        }))
        .await?;

    let exported = aggregator.export_state().await?;
    assert_eq!(exported["sections"]["order"], json!(["a"]));
    assert_eq!(exported["sections"]["bookmarks"], json!(["b"]));
    assert_eq!(aggregator.click_count("d").await?, 3);

    // "d" is clicked but absent from the order list: after "a", before the rest
    let batch = aggregator.aggregate(true).await?;
    let ids: Vec<_> = batch.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "d", "b", "c"]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_import_changes_nothing() -> Result<()> {
    init_tracing();
    let (aggregator, _store) = aggregator(quiet_transport(), TestClock::new());
    aggregator.record_click("keep").await?;
    let before = aggregator.export_state().await?;

    let result = aggregator
        .import_state(&json!({
            "sections": {
                "clicks": {},
                "sources": [{ "id": "bad", "name": "Bad", "url": "not a url", "type": "rss" }]
            }
        }))
        .await;
    assert!(matches!(result, Err(AggregatorError::ImportMalformed(_))));

    let result = aggregator.import_state(&json!("just a string")).await;
    assert!(matches!(result, Err(AggregatorError::ImportMalformed(_))));

    assert_eq!(aggregator.export_state().await?["sections"], before["sections"]);
    Ok(())
}

#[tokio::test]
async fn test_export_import_round_trip_after_reset() -> Result<()> {
    init_tracing();
    let (aggregator, store) = aggregator(quiet_transport(), TestClock::new());

    aggregator.record_click("a").await?;
    aggregator.toggle_bookmark("a").await?;
    aggregator.set_display_name("Grace").await?;
    aggregator.toggle_source("npr-news").await?;
    let exported = aggregator.export_state().await?;
    assert_eq!(exported["exportDate"], json!("2024-05-01T12:00:00Z"));

    aggregator.reset_state().await?;
    assert!(store.is_empty().await);
    assert_eq!(aggregator.display_name().await?, "You");
    assert!(aggregator.bookmarks().await?.is_empty());

    aggregator.import_state(&exported).await?;
    assert_eq!(aggregator.export_state().await?["sections"], exported["sections"]);
    let npr = aggregator.sources().await?.into_iter().find(|s| s.id == "npr-news").unwrap();
    assert!(!npr.enabled);
    Ok(())
}

#[tokio::test]
async fn test_source_list_is_seeded_and_validated() -> Result<()> {
    init_tracing();
    let (aggregator, _store) = aggregator(quiet_transport(), TestClock::new());

    assert_eq!(aggregator.sources().await?, default_sources());

    let invalid = vec![SourceConfig::new("ftp", "FTP", "ftp://files.test/feed", SourceKind::Rss)];
    assert!(matches!(
        aggregator.update_sources(invalid).await,
        Err(AggregatorError::InvalidSource { .. })
    ));
    assert_eq!(aggregator.sources().await?.len(), 9);

    aggregator
        .add_source(SourceConfig::new("api", "API", "https://api.test/news", SourceKind::Json))
        .await?;
    assert!(aggregator
        .add_source(SourceConfig::new("api-2", "API again", "https://api.test/news", SourceKind::Json))
        .await
        .is_err());
    assert_eq!(aggregator.sources().await?.len(), 10);

    assert!(!aggregator.toggle_source("api").await?);
    assert!(aggregator.toggle_source("api").await?);
    assert!(aggregator.toggle_source("missing").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_state_persists_in_sqlite() -> Result<()> {
    init_tracing();
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::connect("sqlite::memory:").await?);
    let state = StateManager::new(store.clone(), TestClock::new());

    assert!(state.toggle_bookmark("persisted").await?);
    state.set_display_name("Lin").await?;

    let reopened = StateManager::new(store, TestClock::new());
    assert_eq!(reopened.bookmarks().await?, vec!["persisted".to_string()]);
    assert_eq!(reopened.display_name().await?, "Lin");
    Ok(())
}

/// Memory store that yields to the scheduler before every operation, so
/// concurrent multi-key writers interleave.
#[derive(Default)]
struct YieldingStore(MemoryStore);

#[async_trait]
impl KeyValueStore for YieldingStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        tokio::task::yield_now().await;
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        self.0.set(key, value).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        self.0.remove(key).await
    }
}

async fn delayed<T>(turns: usize, work: impl std::future::Future<Output = T>) -> T {
    for _ in 0..turns {
        tokio::task::yield_now().await;
    }
    work.await
}

/// A clicked id is in the order list exactly when it has a click count.
async fn assert_history_consistent(store: Arc<dyn KeyValueStore>, id: &str) -> Result<()> {
    let ranker = PersonalizationRanker::new(store, TestClock::new());
    let listed = ranker.order().await?.iter().any(|existing| existing == id);
    let counted = ranker.click_count(id).await? > 0;
    assert_eq!(listed, counted, "order list and click map disagree on {}", id);
    Ok(())
}

#[tokio::test]
async fn test_click_racing_reset_leaves_history_consistent() -> Result<()> {
    init_tracing();

    for turns in 0..8 {
        let store: Arc<dyn KeyValueStore> = Arc::new(YieldingStore::default());
        let aggregator =
            NewsAggregator::with_components(store.clone(), test_config(), quiet_transport(), TestClock::new());

        let (clicked, reset) = tokio::join!(
            aggregator.record_click("a"),
            delayed(turns, aggregator.reset_state())
        );
        clicked?;
        reset?;
        assert_history_consistent(store, "a").await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_click_racing_import_leaves_history_consistent() -> Result<()> {
    init_tracing();
    let document = json!({ "sections": { "clicks": {}, "order": [] } });

    for turns in 0..8 {
        let store: Arc<dyn KeyValueStore> = Arc::new(YieldingStore::default());
        let aggregator =
            NewsAggregator::with_components(store.clone(), test_config(), quiet_transport(), TestClock::new());

        let (clicked, imported) = tokio::join!(
            aggregator.record_click("a"),
            delayed(turns, aggregator.import_state(&document))
        );
        clicked?;
        imported?;
        assert_history_consistent(store, "a").await?;
    }
    Ok(())
}
