use crate::types::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A completed HTTP exchange, reduced to what the fetcher inspects.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for the network layer underneath the source fetcher
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request. `timeout` is the budget for this single attempt.
    async fn get(&self, url: &str, accept: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// Narrow seam for general-purpose place-name recognition.
///
/// The classifier merges whatever an extractor returns with its own city
/// gazetteer, so any entity-recognition backend can be plugged in here.
pub trait PlaceExtractor: Send + Sync {
    fn extract_places(&self, text: &str) -> Vec<String>;
}
