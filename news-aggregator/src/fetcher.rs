use crate::traits::{HttpResponse, HttpTransport};
use crate::types::{AggregatorConfig, AggregatorError, RawPayload, Result, SourceConfig, SourceKind};
use crate::utils::url::via_intermediary;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const SYNDICATION_ACCEPT: &str = "application/rss+xml, application/xml, text/xml";
const JSON_ACCEPT: &str = "application/json";

/// `reqwest`-backed transport used outside of tests.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &AggregatorConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, accept: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// One planned request for a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub url: String,
    pub accept: &'static str,
    pub timeout: Duration,
}

pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    config: AggregatorConfig,
}

impl Fetcher {
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: AggregatorConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport, config }
    }

    /// Requests to try for `source`, in order. Syndication sources go through
    /// every configured intermediary; JSON sources are requested directly.
    pub fn plan_attempts(&self, source: &SourceConfig) -> Vec<Attempt> {
        match source.kind {
            SourceKind::Rss => {
                let timeout = Duration::from_secs(self.config.syndication_timeout_seconds);
                self.config
                    .intermediaries
                    .iter()
                    .map(|prefix| Attempt {
                        url: via_intermediary(prefix, &source.url),
                        accept: SYNDICATION_ACCEPT,
                        timeout,
                    })
                    .collect()
            }
            SourceKind::Json => vec![Attempt {
                url: source.url.clone(),
                accept: JSON_ACCEPT,
                timeout: Duration::from_secs(self.config.json_timeout_seconds),
            }],
        }
    }

    /// Retrieve a well-formed payload for `source`.
    pub async fn fetch(&self, source: &SourceConfig) -> Result<RawPayload> {
        self.fetch_with(source, |payload| {
            if crate::parser::FeedParser::is_well_formed(&payload) {
                Ok(payload)
            } else {
                Err(AggregatorError::MalformedPayload(format!(
                    "{} payload is not well-formed",
                    payload.kind.as_str()
                )))
            }
        })
        .await
    }

    /// Try each planned attempt in turn and hand its payload to `accept`.
    /// The first payload `accept` takes ends the loop; a rejected payload is
    /// treated like a failed request and the next attempt runs.
    pub async fn fetch_with<T, F>(&self, source: &SourceConfig, accept: F) -> Result<T>
    where
        F: Fn(RawPayload) -> Result<T>,
    {
        let start_time = Instant::now();
        let attempts = self.plan_attempts(source);
        let total = attempts.len();
        let mut last_error = None;

        for (index, attempt) in attempts.iter().enumerate() {
            debug!(
                "Fetching {} attempt {}/{}: {}",
                source.name,
                index + 1,
                total,
                attempt.url
            );

            match self.run_attempt(source.kind, attempt).await.and_then(&accept) {
                Ok(value) => {
                    info!(
                        "Successfully fetched {} on attempt {}/{} ({} ms)",
                        source.name,
                        index + 1,
                        total,
                        start_time.elapsed().as_millis()
                    );
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Attempt {}/{} failed for {}: {}", index + 1, total, source.name, e);
                    last_error = Some(e);
                }
            }
        }

        error!("Failed to fetch {} after {} attempts", source.name, total);

        Err(match last_error {
            Some(AggregatorError::MalformedPayload(reason)) => AggregatorError::MalformedPayload(reason),
            Some(e) => AggregatorError::SourceUnreachable {
                source_name: source.name.clone(),
                last_error: e.to_string(),
            },
            None => AggregatorError::SourceUnreachable {
                source_name: source.name.clone(),
                last_error: "no intermediaries configured".to_string(),
            },
        })
    }

    async fn run_attempt(&self, kind: SourceKind, attempt: &Attempt) -> Result<RawPayload> {
        let response = tokio::time::timeout(
            attempt.timeout,
            self.transport.get(&attempt.url, attempt.accept, attempt.timeout),
        )
        .await
        .map_err(|_| AggregatorError::Timeout {
            url: attempt.url.clone(),
            seconds: attempt.timeout.as_secs(),
        })??;

        if !response.is_success() {
            return Err(AggregatorError::HttpStatus {
                status: response.status,
                url: attempt.url.clone(),
            });
        }

        let body = match kind {
            SourceKind::Rss => unwrap_envelope(response.body)?,
            SourceKind::Json => response.body,
        };

        if body.trim().is_empty() {
            return Err(AggregatorError::InvalidResponse("empty body".to_string()));
        }

        Ok(RawPayload { kind, body })
    }
}

/// Relays such as allorigins wrap the document as `{"contents": "..."}`
/// (or `{"data": "..."}`); strip one such layer. Non-JSON bodies pass through.
pub fn unwrap_envelope(body: String) -> Result<String> {
    if !body.trim_start().starts_with('{') {
        return Ok(body);
    }

    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(_) => return Ok(body),
    };

    ["contents", "data"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| {
            AggregatorError::InvalidResponse("envelope has no contents or data field".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unwrapping() -> Result<()> {
        assert_eq!(unwrap_envelope("<rss/>".to_string())?, "<rss/>");
        assert_eq!(
            unwrap_envelope(r#"{"contents":"<rss/>","status":{"http_code":200}}"#.to_string())?,
            "<rss/>"
        );
        assert_eq!(unwrap_envelope(r#"{"data":"<feed/>"}"#.to_string())?, "<feed/>");
        assert!(unwrap_envelope(r#"{"contents":null}"#.to_string()).is_err());
        Ok(())
    }

    #[test]
    fn syndication_sources_plan_one_attempt_per_intermediary() -> Result<()> {
        let fetcher = Fetcher::new(AggregatorConfig::default())?;
        let source = SourceConfig::new("npr", "NPR", "https://feeds.npr.org/1001/rss.xml", SourceKind::Rss);

        let attempts = fetcher.plan_attempts(&source);
        assert_eq!(attempts.len(), 4);
        assert!(attempts[0].url.starts_with("https://api.allorigins.win/get?url=https%3A%2F%2F"));
        assert!(attempts.iter().all(|a| a.timeout == Duration::from_secs(10)));

        let json = SourceConfig::new("api", "API", "https://api.example.com/news", SourceKind::Json);
        let attempts = fetcher.plan_attempts(&json);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].url, "https://api.example.com/news");
        assert_eq!(attempts[0].timeout, Duration::from_secs(15));
        Ok(())
    }
}
