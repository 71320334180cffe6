#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use news_aggregator::{
    AggregatorConfig, AggregatorError, Clock, HttpResponse, HttpTransport, MemoryStore,
    NewsAggregator, Result,
};
use std::sync::{Arc, Mutex};

pub const RELAY_ONE: &str = "https://relay-one.test/?url=";
pub const RELAY_TWO: &str = "https://relay-two.test/?url=";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Clock tests can move forward by hand.
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())))
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut now = self.0.lock().unwrap();
        *now = *now + Duration::minutes(minutes);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

type Route = Box<dyn Fn(&str) -> Result<HttpResponse> + Send + Sync>;

/// Answers every request from a routing closure and remembers what was asked.
pub struct ScriptedTransport {
    route: Route,
    requested: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(route: impl Fn(&str) -> Result<HttpResponse> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            route: Box::new(route),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str, _accept: &str, _timeout: std::time::Duration) -> Result<HttpResponse> {
        self.requested.lock().unwrap().push(url.to_string());
        (self.route)(url)
    }
}

pub fn ok(body: impl Into<String>) -> Result<HttpResponse> {
    Ok(HttpResponse { status: 200, body: body.into() })
}

pub fn status(code: u16) -> Result<HttpResponse> {
    Ok(HttpResponse { status: code, body: String::new() })
}

pub fn refused() -> Result<HttpResponse> {
    Err(AggregatorError::General("connection refused".to_string()))
}

/// RSS 2.0 document from `(guid, title, pubDate)` triples.
pub fn rss(entries: &[(&str, &str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(guid, title, date)| {
            format!(
                "<item><guid>{guid}</guid><title>{title}</title>\
                 <link>https://news.test/{guid}</link>\
                 <description>&lt;p&gt;{title}&lt;/p&gt;</description>\
                 <pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Test</title>{items}</channel></rss>"#)
}

pub fn test_config() -> AggregatorConfig {
    AggregatorConfig {
        intermediaries: vec![RELAY_ONE.to_string(), RELAY_TWO.to_string()],
        ..AggregatorConfig::default()
    }
}

pub fn aggregator(transport: Arc<ScriptedTransport>, clock: Arc<TestClock>) -> (NewsAggregator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let aggregator = NewsAggregator::with_components(store.clone(), test_config(), transport, clock);
    (aggregator, store)
}
