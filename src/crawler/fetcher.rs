//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients that carry the logged-in session headers
//! - Enforcing the mandatory pause between two requests
//! - Retrying transient failures with capped exponential backoff
//! - Recognising a redirect to the login page as a rejected session

use crate::config::{CrawlerConfig, SessionConfig};
use crate::{ConfigError, SieveError};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, USER_AGENT};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    /// HTTP status code
    pub status_code: u16,
    /// Page body content
    pub body: String,
}

/// Errors returned by a [`PageFetcher`]
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Timeout, connection failure, 429 or 5xx; worth retrying
    #[error("transient failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// A transient failure that persisted through every attempt
    #[error("gave up on {url} after {attempts} attempt(s): {message}")]
    Exhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Any other non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The backend sent us to its login page
    #[error("{url} redirected to login page {location}")]
    LoginRedirect { url: String, location: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<FetchError> for SieveError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transient { url, message } => SieveError::Network {
                url,
                attempts: 1,
                message,
            },
            FetchError::Exhausted {
                url,
                attempts,
                message,
            } => SieveError::Network {
                url,
                attempts,
                message,
            },
            FetchError::Status { url, status } => SieveError::Http { url, status },
            FetchError::LoginRedirect { url, location } => SieveError::SessionInvalid {
                url,
                reason: format!("redirected to {}", location),
            },
        }
    }
}

/// Fetches one page of search results
///
/// Implementations are called strictly sequentially by the crawl driver.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client that sends the session headers on every request
///
/// # Arguments
///
/// * `session` - User agent, accept-language and cookie of a logged-in session
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(SieveError)` - A header value is not valid or the client failed to build
pub fn build_http_client(session: &SessionConfig) -> Result<Client, SieveError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(USER_AGENT, header_value("user-agent", &session.user_agent)?);
    headers.insert(
        ACCEPT_LANGUAGE,
        header_value("accept-language", &session.accept_language)?,
    );
    let mut cookie = header_value("cookie", &session.cookie)?;
    cookie.set_sensitive(true);
    headers.insert(COOKIE, cookie);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(5))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, SieveError> {
    HeaderValue::from_str(value.trim()).map_err(|e| {
        SieveError::Config(ConfigError::Validation(format!(
            "session {} is not a valid header value: {}",
            name, e
        )))
    })
}

/// Returns true when a final URL points at the login flow
fn is_login_page(original: &Url, final_url: &Url) -> bool {
    let host_changed = original.host_str() != final_url.host_str();
    let host = final_url.host_str().unwrap_or_default();
    host.starts_with("passport.")
        || (host_changed && host.starts_with("login."))
        || final_url.path().contains("/signin")
        || final_url.path().contains("/login")
}

/// Polite, session-carrying fetcher backed by reqwest
///
/// Only one request is in flight at a time and consecutive requests are
/// separated by at least the configured delay.
pub struct HttpFetcher {
    client: Client,
    request_delay: Duration,
    max_attempts: u32,
    backoff: ExponentialBuilder,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(session: &SessionConfig, crawler: &CrawlerConfig) -> Result<Self, SieveError> {
        let client = build_http_client(session)?;
        let max_attempts = crawler.max_attempts.max(1);
        Ok(Self {
            client,
            request_delay: Duration::from_millis(crawler.request_delay),
            max_attempts,
            backoff: backoff(max_attempts, Duration::from_secs(2), Duration::from_secs(60)),
            last_request: Mutex::new(None),
        })
    }

    /// Overrides the retry delays
    pub fn with_backoff(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.backoff = backoff(self.max_attempts, min_delay, max_delay);
        self
    }

    /// Sleeps until the request delay since the previous request has passed
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                let message = if e.is_timeout() {
                    "Request timeout".to_string()
                } else if e.is_connect() {
                    "Connection refused".to_string()
                } else {
                    e.to_string()
                };
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    message,
                });
            }
        };

        let status = response.status();
        let final_url = response.url().clone();

        if is_login_page(url, &final_url) {
            return Err(FetchError::LoginRedirect {
                url: url.to_string(),
                location: final_url.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Transient {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Transient {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(FetchedPage {
            url: final_url,
            status_code: status.as_u16(),
            body,
        })
    }
}

fn backoff(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay)
        .with_max_times(max_attempts.saturating_sub(1) as usize)
        .with_jitter()
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// Fetches a URL, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Timeout / connection error | Retry with backoff |
    /// | HTTP 429, HTTP 5xx | Retry with backoff |
    /// | Other non-2xx | Immediate `Status` |
    /// | Redirect to login | Immediate `LoginRedirect` |
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result = (|| async move {
            counter.fetch_add(1, Ordering::Relaxed);
            self.wait_turn().await;
            self.fetch_once(url).await
        })
        .retry(self.backoff.clone())
        .sleep(sleep)
        .when(FetchError::is_transient)
        .notify(|err: &FetchError, delay: Duration| {
            tracing::warn!(
                url = %url,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );
        })
        .await;

        match result {
            Err(FetchError::Transient { url, message }) => Err(FetchError::Exhausted {
                url,
                attempts: attempts.load(Ordering::Relaxed),
                message,
            }),
            other => other,
        }
    }
}
