/// Text processing utilities
pub mod text {
    use regex::Regex;
    use std::sync::LazyLock;

    pub const DESCRIPTION_MAX_CHARS: usize = 150;

    static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

    /// Remove complete `<...>` tags and collapse whitespace. A `<` that is
    /// never closed is kept as text.
    pub fn strip_html(html: &str) -> String {
        RE_TAG
            .replace_all(html, "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Decode the handful of entities that survive into feed markup.
    pub fn decode_entities(text: &str) -> String {
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }

    /// Truncate to `max_chars` characters, appending `...` when anything was cut.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
            None => text.to_string(),
        }
    }

    /// Markup to the plain-text description shown with an item.
    pub fn plain_description(markup: &str) -> String {
        let text = decode_entities(&strip_html(markup));
        truncate_chars(text.trim(), DESCRIPTION_MAX_CHARS)
    }
}

/// URL utilities
pub mod url {
    /// Build the relay URL for `target`: the intermediary prefix followed by
    /// the percent-encoded target.
    pub fn via_intermediary(prefix: &str, target: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("{}{}", prefix, encoded)
    }

    /// Protocol-relative URLs become https; anything without an http(s)
    /// scheme is rejected.
    pub fn normalize_image_url(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.starts_with("//") {
            return Some(format!("https:{}", trimmed));
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Some(trimmed.to_string())
        } else {
            None
        }
    }
}

/// Time utilities
pub mod time {
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

    /// Check if enough time has passed since last update
    pub fn should_refresh(
        last_refresh: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        interval_minutes: i64,
    ) -> bool {
        match last_refresh {
            None => true,
            Some(last) => now.signed_duration_since(last) >= Duration::minutes(interval_minutes),
        }
    }

    /// Parse the date formats found in feeds: RFC 2822 (RSS), RFC 3339
    /// (Atom, JSON APIs), and bare ISO date-times assumed to be UTC.
    pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(naive.and_utc());
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}
