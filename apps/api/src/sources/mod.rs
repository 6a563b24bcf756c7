#![allow(dead_code)]

//! Message-source clients. One module per external platform; all of them
//! speak the same `MessageSource` trait so the sync pipeline never knows
//! which API it is talking to.

pub mod gmail;
pub mod slack;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// External platform a message originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Gmail,
    Slack,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Gmail => "gmail",
            SourceKind::Slack => "slack",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gmail" => Some(SourceKind::Gmail),
            "slack" => Some(SourceKind::Slack),
            _ => None,
        }
    }
}

/// Source-native timestamp, tagged by wire format.
///
/// Every source encodes time differently on the wire; carrying the raw text
/// under an explicit tag gives each format one parser (`items::validate`)
/// instead of parse-int-then-fallback chains at every call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeTimestamp {
    /// Epoch milliseconds encoded as text (Gmail `internalDate`).
    EpochMillis(String),
    /// Epoch seconds with optional fractional part (Slack `ts`).
    EpochSeconds(String),
    /// RFC 3339 / ISO-8601 string.
    Rfc3339(String),
}

/// A message as fetched from a source, before validation or classification.
/// The timestamp is left in its native form; normalizing it is the
/// validator's job.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub timestamp: NativeTimestamp,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream API rejected the access token. Never retried here; the
    /// credential has to be refreshed by whatever owns the OAuth flow.
    #[error("{0} rejected the access token")]
    AuthExpired(&'static str),
}

/// A connected message platform the sync pipeline can pull from.
///
/// `fetch` resolves to an empty list on malformed upstream payloads and on
/// transient failure after retries are exhausted — callers treat "nothing
/// there" and "could not read" identically. Only a rejected token surfaces
/// as an error.
#[async_trait]
pub trait MessageSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch messages for one user. With `target_day`, the fetch is scoped
    /// to that UTC calendar day in the source's native query syntax; without
    /// it, one bounded page of the most recent messages.
    async fn fetch(
        &self,
        access_token: &str,
        target_day: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>, SourceError>;
}

/// Minimum-spacing gate between calls to one source API.
/// Locking across the sleep serializes callers, which is the point.
pub(crate) struct Throttle {
    min_delay: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl Throttle {
    pub(crate) fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last: tokio::sync::Mutex::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Sends a request, retrying 429s (honoring `Retry-After`) and 5xx with
/// exponential backoff. Returns `Ok(None)` when the upstream stays broken
/// or sends something unparseable; `Err` only for a rejected token.
pub(crate) async fn fetch_json_with_retry<F>(
    source: &'static str,
    build: F,
) -> Result<Option<serde_json::Value>, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("{source} request failed: {e}");
                continue;
            }
        };

        let status = response.status();

        if status.as_u16() == 401 {
            return Err(SourceError::AuthExpired(source));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            if let Some(secs) = retry_after {
                backoff = Duration::from_secs(secs).min(MAX_BACKOFF);
            }
            warn!("{source} returned {status}, retrying");
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{source} returned {status}: {body}");
            return Ok(None);
        }

        match response.json::<serde_json::Value>().await {
            Ok(v) => return Ok(Some(v)),
            Err(e) => {
                warn!("{source} sent malformed JSON: {e}");
                return Ok(None);
            }
        }
    }

    warn!("{source} fetch failed after {MAX_ATTEMPTS} attempts");
    Ok(None)
}
