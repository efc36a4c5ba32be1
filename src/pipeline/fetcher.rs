//! Rate-limited fetcher
//!
//! This module wraps a [`Transport`] with the request discipline the scraper
//! needs:
//! - A minimum gap between consecutive requests, per request kind
//! - A fixed cooldown and bounded retry on HTTP 429 and transient failures
//! - Status classification into page-level errors
//! - Cancellation of every sleep and of the request in flight

use crate::config::ScraperConfig;
use crate::pipeline::transport::{RawResponse, Transport};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const TOO_MANY_REQUESTS: u16 = 429;

/// What a request is for; selects the pacing gap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Page,
    Cover,
}

/// Errors a fetch can end with
///
/// All of them are page-level: the caller logs, counts and moves on.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },

    #[error("still rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("interrupted")]
    Interrupted,
}

/// Request counters kept for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Requests handed to the transport
    pub requests: u32,

    /// Cooldown sleeps taken after a 429 or a transient failure
    pub cooldowns: u32,

    /// Requests that repeated an earlier failed attempt
    pub retries: u32,
}

/// Sleeps for `duration` unless the token fires first
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Interrupted);
    }
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Interrupted),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Fetcher that paces, retries and classifies requests
pub struct RateLimitedFetcher<T> {
    transport: T,
    cancel: CancellationToken,
    page_gap: Duration,
    cover_gap: Duration,
    cooldown: Duration,
    max_attempts: u32,
    last_request: Option<Instant>,
    stats: FetchStats,
}

impl<T: Transport> RateLimitedFetcher<T> {
    /// Creates a fetcher with delays and retry limits taken from `config`
    pub fn new(transport: T, config: &ScraperConfig, cancel: CancellationToken) -> Self {
        Self {
            transport,
            cancel,
            page_gap: config.page_delay(),
            cover_gap: config.cover_delay(),
            cooldown: config.rate_limit_wait(),
            max_attempts: config.network.retry_attempts.max(1),
            last_request: None,
            stats: FetchStats::default(),
        }
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetches `url` and returns the successful response
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx | Return the body |
    /// | HTTP 429 | Cooldown, retry up to the attempt limit → RateLimited |
    /// | Timeout / connect / dropped connection | Cooldown, retry up to the attempt limit → Network |
    /// | Other HTTP status | Immediate → Status |
    /// | Other request error | Immediate → Network |
    /// | Cancellation | Immediate → Interrupted |
    pub async fn fetch(&mut self, url: &str, kind: RequestKind) -> Result<RawResponse, FetchError> {
        let mut last_error = FetchError::Interrupted;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                self.stats.cooldowns += 1;
                tracing::warn!(
                    "{}; cooling down {:.0}s before attempt {}/{} for {}",
                    last_error,
                    self.cooldown.as_secs_f64(),
                    attempt,
                    self.max_attempts,
                    url
                );
                pause(&self.cancel, self.cooldown).await?;
                self.stats.retries += 1;
            }

            self.wait_turn(kind).await?;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Interrupted),
                result = self.transport.get(url) => result,
            };
            self.last_request = Some(Instant::now());
            self.stats.requests += 1;

            // A response that lands after cancellation is discarded
            if self.cancel.is_cancelled() {
                return Err(FetchError::Interrupted);
            }

            match result {
                Ok(response) if response.is_success() => {
                    tracing::debug!("Fetched {} ({} bytes)", url, response.body.len());
                    return Ok(response);
                }
                Ok(response) if response.status == TOO_MANY_REQUESTS => {
                    last_error = FetchError::RateLimited { attempts: attempt };
                }
                Ok(response) => {
                    return Err(FetchError::Status {
                        status: response.status,
                    });
                }
                Err(e) if e.is_transient() => {
                    last_error = FetchError::Network {
                        attempts: attempt,
                        message: e.to_string(),
                    };
                }
                Err(e) => {
                    return Err(FetchError::Network {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_error)
    }

    /// Sleeps whatever is left of the gap since the previous request
    async fn wait_turn(&self, kind: RequestKind) -> Result<(), FetchError> {
        let gap = match kind {
            RequestKind::Page => self.page_gap,
            RequestKind::Cover => self.cover_gap,
        };

        let shortfall = match self.last_request {
            Some(last) => gap.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        };

        pause(&self.cancel, shortfall).await
    }
}
