use crate::config::FetchConfig;
use crate::traits::Transport;
use crate::types::{FeedcastError, TransportError};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use tracing::{debug, info, warn};

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// reqwest-backed transport with a hard per-request timeout.
pub struct HttpTransport {
    client: Client,
    timeout_seconds: u64,
    max_feed_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FeedcastError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            timeout_seconds: config.timeout_seconds,
            max_feed_bytes: config.max_feed_size_mb * 1024 * 1024,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else {
            TransportError::Http(e)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let start_time = Instant::now();
        let target = Url::parse(url)?;
        debug!("GET {}", target);

        let response = self
            .client
            .get(target)
            .header(ACCEPT, FEED_ACCEPT)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_feed_bytes {
                return Err(TransportError::TooLarge {
                    size_kb: content_length as usize / 1024,
                });
            }
        }

        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        if body.len() > self.max_feed_bytes {
            return Err(TransportError::TooLarge {
                size_kb: body.len() / 1024,
            });
        }

        info!(
            "Fetched {} ({} bytes in {}ms)",
            url,
            body.len(),
            start_time.elapsed().as_millis()
        );
        Ok(body.to_vec())
    }
}

/// Transport front-end that retries failed GETs with exponential backoff.
/// With `max_retries == 0` every URL gets exactly one request.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, config: &FetchConfig) -> Self {
        Self {
            transport,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let mut backoff = ExponentialBackoff {
            current_interval: self.retry_delay,
            initial_interval: self.retry_delay,
            max_interval: self.retry_delay * 32,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.transport.get(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.retry_delay);
                    warn!("Attempt {} failed for {}: {}; retrying in {:?}", attempt, url, e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
