//! Slack source client.
//!
//! Day scoping uses `conversations.history`'s `oldest`/`latest` parameters,
//! which take epoch seconds with a fractional part. `inclusive=true` keeps
//! the start boundary; the pipeline's own day filter enforces the exclusive
//! end, so a message landing exactly on `latest` never leaks through.
//!
//! Slack quirk: most failures come back as HTTP 200 with `ok: false` and an
//! error code in the body, so auth expiry has to be detected there as well
//! as on a real 401.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::items::dates::utc_day_bounds;
use crate::sources::{
    fetch_json_with_retry, MessageSource, NativeTimestamp, RawMessage, SourceError, SourceKind,
    Throttle,
};

const LIST_URL: &str = "https://slack.com/api/conversations.list";
const HISTORY_URL: &str = "https://slack.com/api/conversations.history";
const CHANNEL_PAGE: u32 = 10;
const HISTORY_PAGE: u32 = 50;
const MIN_CALL_SPACING: Duration = Duration::from_millis(600);

pub struct SlackSource {
    client: reqwest::Client,
    throttle: Throttle,
}

#[derive(Debug, Deserialize)]
struct SlackEnvelope {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    #[serde(rename = "type")]
    kind: String,
    /// Joins, topic changes and other noise carry a subtype; plain user
    /// messages do not.
    subtype: Option<String>,
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: Option<String>,
}

impl SlackSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            throttle: Throttle::new(MIN_CALL_SPACING),
        }
    }

    /// Epoch-second bounds for a single UTC day, formatted the way
    /// `oldest`/`latest` expect them.
    fn day_bounds(target_day: DateTime<Utc>) -> (String, String) {
        let (start, end) = utc_day_bounds(target_day);
        (
            format!("{}.000000", start.timestamp()),
            format!("{}.000000", end.timestamp()),
        )
    }

    /// Parses a Slack payload, translating body-level auth errors into
    /// `AuthExpired`. Returns `None` for any other unusable payload.
    fn parse_envelope<T: serde::de::DeserializeOwned>(
        payload: serde_json::Value,
    ) -> Result<Option<T>, SourceError> {
        let envelope: SlackEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(e) => e,
            Err(e) => {
                warn!("slack payload had unexpected shape: {e}");
                return Ok(None);
            }
        };
        if !envelope.ok {
            let code = envelope.error.unwrap_or_default();
            if code == "invalid_auth" || code == "token_revoked" || code == "token_expired" {
                return Err(SourceError::AuthExpired("slack"));
            }
            warn!("slack API refused the call: {code}");
            return Ok(None);
        }
        match serde_json::from_value(payload) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                warn!("slack payload had unexpected shape: {e}");
                Ok(None)
            }
        }
    }

    async fn channel_history(
        &self,
        access_token: &str,
        channel: &str,
        target_day: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>, SourceError> {
        self.throttle.wait().await;

        let mut params = vec![
            ("channel", channel.to_string()),
            ("limit", HISTORY_PAGE.to_string()),
        ];
        if let Some(day) = target_day {
            let (oldest, latest) = Self::day_bounds(day);
            params.push(("oldest", oldest));
            params.push(("latest", latest));
            params.push(("inclusive", "true".to_string()));
        }

        let payload = fetch_json_with_retry("slack", || {
            self.client
                .get(HISTORY_URL)
                .bearer_auth(access_token)
                .query(&params)
        })
        .await?;

        let Some(payload) = payload else {
            return Ok(vec![]);
        };
        let Some(history) = Self::parse_envelope::<History>(payload)? else {
            return Ok(vec![]);
        };

        let messages = history
            .messages
            .into_iter()
            .filter(|m| m.kind == "message" && m.subtype.is_none())
            .filter_map(|m| {
                let ts = m.ts?;
                Some(RawMessage {
                    // A Slack ts is only unique within its channel.
                    id: format!("{channel}:{ts}"),
                    subject: String::new(),
                    sender: m.user.unwrap_or_else(|| "unknown".to_string()),
                    body: m.text,
                    timestamp: NativeTimestamp::EpochSeconds(ts),
                })
            })
            .collect();
        Ok(messages)
    }
}

#[async_trait]
impl MessageSource for SlackSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Slack
    }

    async fn fetch(
        &self,
        access_token: &str,
        target_day: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>, SourceError> {
        if access_token.trim().is_empty() {
            return Ok(vec![]);
        }

        self.throttle.wait().await;
        let payload = fetch_json_with_retry("slack", || {
            self.client
                .get(LIST_URL)
                .bearer_auth(access_token)
                .query(&[
                    ("types", "im".to_string()),
                    ("limit", CHANNEL_PAGE.to_string()),
                ])
        })
        .await?;

        let Some(payload) = payload else {
            return Ok(vec![]);
        };
        let Some(list) = Self::parse_envelope::<ChannelList>(payload)? else {
            return Ok(vec![]);
        };

        let mut messages = Vec::new();
        for channel in &list.channels {
            let mut batch = self
                .channel_history(access_token, &channel.id, target_day)
                .await?;
            messages.append(&mut batch);
            if messages.len() >= HISTORY_PAGE as usize {
                messages.truncate(HISTORY_PAGE as usize);
                break;
            }
        }

        debug!("slack fetch returned {} messages", messages.len());
        Ok(messages)
    }
}
