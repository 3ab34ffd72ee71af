//! Fetcher for public Telegram channels via their web preview.
//!
//! Each source id is normalised to a channel username, then `GET {base}/s/{username}`
//! is scraped. Retries and backoff are delegated to [`sieve_http::HttpClient`];
//! an optional rate limiter actor spaces requests across all workers.
use std::time::Duration;

use sieve_actors::actor::Addr;
use sieve_actors::rate::{self, RateKey, RateLimiter};
use sieve_common::{FailureReason, FetchOutcome, Fetcher, SieveError};
use sieve_http::{HttpClient, HttpError, RequestOpts};

use super::extract::{parse_channel_meta, parse_channel_page};

const DEFAULT_MAX_MESSAGES: usize = 50;

/// Channel username from any of `name`, `@name`, `t.me/name`,
/// `https://t.me/name` or `https://t.me/s/name`.
///
/// ```
/// use sieve_social::telegram::normalize_channel;
///
/// assert_eq!(normalize_channel("https://t.me/s/rust_news").unwrap(), "rust_news");
/// assert_eq!(normalize_channel("@rust_news").unwrap(), "rust_news");
/// assert!(normalize_channel("abc").is_err());
/// ```
pub fn normalize_channel(source: &str) -> sieve_common::Result<String> {
    let mut s = source.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest;
        }
    }
    s = s.strip_prefix("www.").unwrap_or(s);
    if let Some(rest) = s.strip_prefix("t.me/") {
        s = rest.strip_prefix("s/").unwrap_or(rest);
    }
    s = s.strip_prefix('@').unwrap_or(s);
    let s = s.split(['?', '#']).next().unwrap_or_default();
    let s = s.trim_end_matches('/');

    let valid_chars = s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !(5..=32).contains(&s.len()) || !valid_chars {
        return Err(SieveError::InvalidInput(format!(
            "not a Telegram channel: {source:?}"
        )));
    }
    Ok(s.to_string())
}

#[derive(Clone)]
pub struct TelegramFetcher {
    http: HttpClient,
    max_messages: usize,
    limiter: Option<(Addr<RateLimiter>, RateKey)>,
}

impl TelegramFetcher {
    /// `base_url` is normally `https://t.me`.
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        Ok(Self::from_http(HttpClient::new(base_url)?))
    }

    /// Use an already configured client; its base URL must point at `t.me`.
    pub fn from_http(http: HttpClient) -> Self {
        Self {
            http,
            max_messages: DEFAULT_MAX_MESSAGES,
            limiter: None,
        }
    }

    pub fn with_max_messages(mut self, n: usize) -> Self {
        self.max_messages = n;
        self
    }

    /// Acquire one token from `limiter` under `key` before every request.
    pub fn with_rate_limiter(mut self, limiter: Addr<RateLimiter>, key: RateKey) -> Self {
        self.limiter = Some((limiter, key));
        self
    }

    async fn fetch_page(&self, username: &str, timeout: Duration) -> Result<String, FailureReason> {
        if let Some((limiter, key)) = &self.limiter {
            rate::acquire(limiter, key, 1)
                .await
                .map_err(|e| FailureReason::Fetch(e.to_string()))?;
        }
        let opts = RequestOpts {
            timeout: Some(timeout),
            ..Default::default()
        };
        self.http
            .get_text(&format!("s/{username}"), opts)
            .await
            .map_err(|e| match e.status() {
                Some(status) => FailureReason::Fetch(format!("HTTP {}", status.as_u16())),
                None => FailureReason::Fetch(e.to_string()),
            })
    }
}

#[async_trait::async_trait]
impl Fetcher for TelegramFetcher {
    async fn fetch(&self, source_id: &str, timeout: Duration) -> FetchOutcome {
        let username = match normalize_channel(source_id) {
            Ok(u) => u,
            Err(e) => return FetchOutcome::failure(source_id, FailureReason::Fetch(e.to_string())),
        };

        let html = match self.fetch_page(&username, timeout).await {
            Ok(html) => html,
            Err(reason) => {
                tracing::debug!(source_id, reason = %reason, "telegram.fetch_failed");
                return FetchOutcome::failure(source_id, reason);
            }
        };

        // Ids stay keyed on the channel name; records carry the id as submitted.
        let mut records = parse_channel_page(&html, &username, self.max_messages);
        for record in &mut records {
            record.source_id = source_id.to_string();
        }
        // t.me redirects unknown or private channels to a page with no preview
        if records.is_empty() && parse_channel_meta(&html).is_none() {
            return FetchOutcome::failure(
                source_id,
                FailureReason::Fetch("channel not found or preview unavailable".into()),
            );
        }
        tracing::debug!(source_id, username = %username, records = records.len(), "telegram.fetched");
        FetchOutcome::success(source_id, records)
    }
}
