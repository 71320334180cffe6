use crate::types::CanonicalItem;
use std::collections::HashSet;
use tracing::{debug, info};

const FINGERPRINT_CHARS: usize = 50;

/// Lowercased title, cut to its first 50 characters.
pub fn fingerprint(title: &str) -> String {
    title.to_lowercase().chars().take(FINGERPRINT_CHARS).collect()
}

/// Drop items whose title fingerprint has already been seen. Order is kept and
/// the first occurrence wins, whichever source it came from.
///
/// Distinct stories that happen to share a long leading title are collapsed
/// too; the heuristic accepts that.
pub fn deduplicate(items: Vec<CanonicalItem>) -> Vec<CanonicalItem> {
    let total = items.len();
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(total);

    for item in items {
        if seen.insert(fingerprint(&item.title)) {
            unique.push(item);
        } else {
            debug!("Removing duplicate item: {} ({})", item.title, item.source);
        }
    }

    let removed_count = total - unique.len();
    if removed_count > 0 {
        info!("Removed {} duplicate items", removed_count);
    }

    unique
}
