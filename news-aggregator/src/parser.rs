use crate::types::{AggregatorError, CanonicalItem, Clock, RawPayload, Result, SourceKind};
use crate::utils::{text, time, url};
use regex::Regex;
use roxmltree::{Document, Node, ParsingOptions};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use uuid::Uuid;

const MEDIA_NS: &str = "http://search.yahoo.com/mrss/";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

static RE_IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<img[^>]+src="([^"]+)""#).unwrap());

type ParseFn = fn(&str, &str, &dyn Clock) -> Result<Vec<CanonicalItem>>;

/// Parse strategy per declared source type.
const STRATEGIES: [(SourceKind, ParseFn); 2] = [
    (SourceKind::Rss, parse_syndication),
    (SourceKind::Json, parse_json),
];

pub struct FeedParser {
    clock: Arc<dyn Clock>,
}

impl FeedParser {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Normalize a payload into canonical items. Entries without a title or a
    /// link are dropped; a payload that cannot be read at all is an error.
    pub fn parse(&self, raw: &RawPayload, source_name: &str) -> Result<Vec<CanonicalItem>> {
        debug!(
            "Parsing {} payload from {} ({} bytes)",
            raw.kind.as_str(),
            source_name,
            raw.body.len()
        );

        let strategy = STRATEGIES
            .iter()
            .find(|(kind, _)| *kind == raw.kind)
            .map(|(_, parse)| *parse)
            .ok_or_else(|| {
                AggregatorError::General(format!("no parser for {}", raw.kind.as_str()))
            })?;

        let items = strategy(&raw.body, source_name, self.clock.as_ref())?;
        info!("Parsed {} items from {}", items.len(), source_name);
        Ok(items)
    }

    /// Cheap structural check used when a payload is fetched without parsing.
    pub fn is_well_formed(raw: &RawPayload) -> bool {
        match raw.kind {
            SourceKind::Rss => read_document(&raw.body).is_ok(),
            SourceKind::Json => serde_json::from_str::<Value>(&raw.body)
                .map(|v| v.is_object())
                .unwrap_or(false),
        }
    }
}

fn read_document(body: &str) -> Result<Document<'_>> {
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    Document::parse_with_options(body.trim_start_matches('\u{feff}').trim(), options)
        .map_err(|e| AggregatorError::MalformedPayload(format!("failed to parse XML: {}", e)))
}

fn parse_syndication(body: &str, source_name: &str, clock: &dyn Clock) -> Result<Vec<CanonicalItem>> {
    let doc = read_document(body)?;

    // RSS items first, Atom entries only when the document has no items.
    let mut entries: Vec<Node> = elements_named(&doc, "item");
    if entries.is_empty() {
        entries = elements_named(&doc, "entry");
    }
    if entries.is_empty() {
        return Err(AggregatorError::MalformedPayload("no items found in feed".to_string()));
    }

    Ok(entries
        .iter()
        .filter_map(|entry| syndication_entry(entry, source_name, clock))
        .collect())
}

fn elements_named<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Vec<Node<'a, 'input>> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .collect()
}

fn syndication_entry(entry: &Node, source_name: &str, clock: &dyn Clock) -> Option<CanonicalItem> {
    let title = child_text(entry, &["title"]).unwrap_or_default();
    let link = entry_link(entry).unwrap_or_default();
    if title.is_empty() || link.is_empty() {
        debug!("Dropping entry without title or link from {}", source_name);
        return None;
    }

    let raw_description = child_text(entry, &["description", "summary", "content"]).unwrap_or_default();
    let pub_date = child_text(entry, &["pubDate", "published", "updated"])
        .or_else(|| child_text_ns(entry, DC_NS, "date"))
        .and_then(|raw| time::parse_feed_date(&raw))
        .unwrap_or_else(|| clock.now());
    let id = child_text(entry, &["guid", "id"])
        .unwrap_or_else(|| fallback_id(&link, &title));
    let image_url = entry_image(entry, &raw_description);

    Some(CanonicalItem {
        id,
        title,
        link,
        description: text::plain_description(&raw_description),
        pub_date,
        source: source_name.to_string(),
        category: None,
        locations: Vec::new(),
        content: raw_description,
        image_url,
    })
}

/// Children that belong to the entry's own vocabulary, so that extension
/// elements such as `media:content` never stand in for Atom `content`.
fn own_children<'a, 'input: 'a>(entry: &Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    let ns = entry.tag_name().namespace();
    entry
        .children()
        .filter(move |c| c.is_element() && c.tag_name().namespace() == ns)
}

/// Concatenated text of a node and its descendants, trimmed.
fn node_text(node: &Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// First non-empty text among `names`, in the priority order given.
fn child_text(entry: &Node, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        own_children(entry)
            .find(|c| c.tag_name().name() == *name)
            .map(|c| node_text(&c))
            .filter(|t| !t.is_empty())
    })
}

fn child_text_ns(entry: &Node, ns: &str, name: &str) -> Option<String> {
    entry
        .children()
        .find(|c| c.is_element() && c.tag_name().namespace() == Some(ns) && c.tag_name().name() == name)
        .map(|c| node_text(&c))
        .filter(|t| !t.is_empty())
}

fn non_empty_attr(node: &Node, name: &str) -> Option<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn entry_link(entry: &Node) -> Option<String> {
    let links: Vec<Node> = own_children(entry)
        .filter(|c| c.tag_name().name() == "link")
        .collect();

    links
        .iter()
        .map(node_text)
        .find(|t| !t.is_empty())
        .or_else(|| {
            links
                .iter()
                .filter(|l| matches!(l.attribute("rel"), None | Some("alternate")))
                .find_map(|l| non_empty_attr(l, "href"))
        })
        .or_else(|| links.iter().find_map(|l| non_empty_attr(l, "href")))
}

fn fallback_id(link: &str, title: &str) -> String {
    if !link.is_empty() {
        link.to_string()
    } else if !title.is_empty() {
        title.to_string()
    } else {
        Uuid::new_v4().to_string()
    }
}

fn entry_image(entry: &Node, raw_description: &str) -> Option<String> {
    let candidate = media_image(entry)
        .or_else(|| enclosure_image(entry))
        .or_else(|| {
            RE_IMG_SRC
                .captures(raw_description)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .or_else(|| image_element(entry));

    // The winning candidate is validated once; an invalid one does not fall
    // through to lower-priority sources.
    candidate.and_then(|raw| url::normalize_image_url(&raw))
}

fn media_image(entry: &Node) -> Option<String> {
    let media: Vec<Node> = entry
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().namespace() == Some(MEDIA_NS))
        .collect();

    let is_image_content = |n: &Node| {
        let medium = n.attribute("medium");
        let mime = n.attribute("type");
        match (medium, mime) {
            (None, None) => true,
            (Some(medium), _) if medium == "image" => true,
            (_, Some(mime)) => mime.starts_with("image/"),
            _ => false,
        }
    };

    media
        .iter()
        .filter(|n| n.tag_name().name() == "content" && is_image_content(*n))
        .find_map(|n| non_empty_attr(n, "url"))
        .or_else(|| {
            media
                .iter()
                .filter(|n| n.tag_name().name() == "thumbnail")
                .find_map(|n| non_empty_attr(n, "url"))
        })
}

fn enclosure_image(entry: &Node) -> Option<String> {
    own_children(entry)
        .filter(|c| c.tag_name().name() == "enclosure")
        .filter(|c| c.attribute("type").is_some_and(|t| t.starts_with("image/")))
        .find_map(|c| non_empty_attr(&c, "url"))
}

fn image_element(entry: &Node) -> Option<String> {
    entry
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "image")
        .find_map(|c| {
            let text = node_text(&c);
            if text.is_empty() {
                non_empty_attr(&c, "href")
            } else {
                Some(text)
            }
        })
}

fn parse_json(body: &str, source_name: &str, clock: &dyn Clock) -> Result<Vec<CanonicalItem>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AggregatorError::MalformedPayload(format!("invalid JSON: {}", e)))?;
    let root = value
        .as_object()
        .ok_or_else(|| AggregatorError::MalformedPayload("expected a JSON object".to_string()))?;

    let articles = match root.get("articles").and_then(Value::as_array) {
        Some(articles) => articles,
        None => {
            debug!("JSON payload from {} has no articles array", source_name);
            return Ok(Vec::new());
        }
    };

    Ok(articles
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|article| json_article(article, source_name, clock))
        .collect())
}

fn json_article(article: &Map<String, Value>, source_name: &str, clock: &dyn Clock) -> Option<CanonicalItem> {
    let title = string_field(article, &["title"]).unwrap_or_default();
    let link = string_field(article, &["url", "link"]).unwrap_or_default();
    if title.is_empty() || link.is_empty() {
        debug!("Dropping article without title or link from {}", source_name);
        return None;
    }

    let raw_description = string_field(article, &["description", "summary"]).unwrap_or_default();
    let pub_date = string_field(article, &["publishedAt", "date", "pubDate"])
        .and_then(|raw| time::parse_feed_date(&raw))
        .unwrap_or_else(|| clock.now());
    let source = article
        .get("source")
        .and_then(|s| match s {
            Value::Object(obj) => string_field(obj, &["name"]),
            Value::String(name) if !name.trim().is_empty() => Some(name.trim().to_string()),
            _ => None,
        })
        .unwrap_or_else(|| source_name.to_string());
    let id = string_field(article, &["id"]).unwrap_or_else(|| fallback_id(&link, &title));
    let image_url = string_field(article, &["urlToImage", "image", "thumbnail"])
        .and_then(|raw| url::normalize_image_url(&raw));
    let content = string_field(article, &["content"]).unwrap_or_else(|| raw_description.clone());

    Some(CanonicalItem {
        id,
        title,
        link,
        description: text::plain_description(&raw_description),
        pub_date,
        source,
        category: None,
        locations: Vec::new(),
        content,
        image_url,
    })
}

/// First non-empty string (or number, for ids) among `names`.
fn string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match obj.get(*name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
