use crate::state::{load_section, save_section};
use crate::types::{keys, CanonicalItem, ClickRecord, Clock, KeyValueStore, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

pub type ClickMap = HashMap<String, ClickRecord>;

/// Click history and the ranking derived from it.
pub struct PersonalizationRanker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    // Held across the read-modify-write of the click map and order list.
    click_lock: Mutex<()>,
}

impl PersonalizationRanker {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            click_lock: Mutex::new(()),
        }
    }

    pub async fn clicks(&self) -> Result<ClickMap> {
        Ok(load_section(self.store.as_ref(), keys::CLICKS).await?.unwrap_or_default())
    }

    /// Ids, most recently clicked first.
    pub async fn order(&self) -> Result<Vec<String>> {
        Ok(load_section(self.store.as_ref(), keys::ORDER).await?.unwrap_or_default())
    }

    pub async fn click_count(&self, id: &str) -> Result<u64> {
        Ok(self.clicks().await?.get(id).map_or(0, |record| record.count))
    }

    /// Exclusive access to the click map and order list. Anything else that
    /// rewrites those sections holds this for the duration of the write.
    pub async fn lock_history(&self) -> MutexGuard<'_, ()> {
        self.click_lock.lock().await
    }

    /// Bump the click count for `id` and move it to the front of the order list.
    pub async fn record_click(&self, id: &str) -> Result<ClickRecord> {
        let _guard = self.lock_history().await;
        let now = self.clock.now();

        let mut clicks = self.clicks().await?;
        let record = clicks.entry(id.to_string()).or_insert(ClickRecord {
            count: 0,
            last_clicked: now,
        });
        record.count += 1;
        record.last_clicked = now;
        let record = record.clone();
        save_section(self.store.as_ref(), keys::CLICKS, &clicks).await?;

        let mut order = self.order().await?;
        order.retain(|existing| existing != id);
        order.insert(0, id.to_string());
        save_section(self.store.as_ref(), keys::ORDER, &order).await?;

        debug!("Recorded click on {} (count {})", id, record.count);
        Ok(record)
    }

    /// Rank `items` against the persisted click history.
    pub async fn rank(&self, items: Vec<CanonicalItem>) -> Result<Vec<CanonicalItem>> {
        let clicks = self.clicks().await?;
        let order = self.order().await?;
        Ok(reorder(items, &clicks, &order))
    }
}

/// Clicked items first, in order-list position; clicked items missing from the
/// order list follow by click count, highest first. Unclicked items come last,
/// newest first. Both sorts are stable.
pub fn reorder(items: Vec<CanonicalItem>, clicks: &ClickMap, order: &[String]) -> Vec<CanonicalItem> {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(order.len());
    for (index, id) in order.iter().enumerate() {
        position.entry(id.as_str()).or_insert(index);
    }

    let (mut clicked, mut unclicked): (Vec<_>, Vec<_>) =
        items.into_iter().partition(|item| clicks.contains_key(&item.id));

    clicked.sort_by(|a, b| {
        match (position.get(a.id.as_str()), position.get(b.id.as_str())) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => clicks[&b.id].count.cmp(&clicks[&a.id].count),
        }
    });
    unclicked.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));

    clicked.extend(unclicked);
    clicked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn item(id: &str, hours_ago: i64) -> CanonicalItem {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        CanonicalItem {
            id: id.to_string(),
            title: format!("Story {}", id),
            link: format!("https://example.com/{}", id),
            description: String::new(),
            pub_date: base - Duration::hours(hours_ago),
            source: "Test".to_string(),
            category: None,
            locations: Vec::new(),
            content: String::new(),
            image_url: None,
        }
    }

    fn clicks(entries: &[(&str, u64)]) -> ClickMap {
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        entries
            .iter()
            .map(|(id, count)| (id.to_string(), ClickRecord { count: *count, last_clicked: when }))
            .collect()
    }

    fn ids(items: &[CanonicalItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn unclicked_items_sort_newest_first() {
        let ranked = reorder(vec![item("old", 5), item("new", 1), item("mid", 3)], &ClickMap::new(), &[]);
        assert_eq!(ids(&ranked), vec!["new", "mid", "old"]);
    }

    #[test]
    fn clicked_items_follow_order_list() {
        let items = vec![item("a", 1), item("b", 2), item("c", 3), item("d", 4)];
        let order = vec!["c".to_string(), "a".to_string()];
        let ranked = reorder(items, &clicks(&[("a", 1), ("c", 1)]), &order);
        assert_eq!(ids(&ranked), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn clicked_ids_missing_from_order_rank_after_ordered_by_count() {
        let items = vec![item("a", 1), item("b", 2), item("c", 3), item("d", 4)];
        let order = vec!["d".to_string()];
        let ranked = reorder(items, &clicks(&[("a", 2), ("b", 7), ("d", 1)]), &order);
        assert_eq!(ids(&ranked), vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn every_clicked_item_precedes_every_unclicked_item() {
        let items: Vec<_> = (0..10).map(|i| item(&i.to_string(), i)).collect();
        let map = clicks(&[("9", 1), ("4", 3), ("7", 2)]);
        let ranked = reorder(items, &map, &["7".to_string()]);
        let boundary = ranked.iter().position(|i| !map.contains_key(&i.id)).unwrap();
        assert_eq!(boundary, 3);
        assert!(ranked[boundary..].iter().all(|i| !map.contains_key(&i.id)));
    }
}
