//! Gmail source client.
//!
//! Day scoping uses Gmail's search operators: `after:` is inclusive of the
//! named date and `before:` is exclusive, so a single UTC day becomes
//! `after:<day> before:<next day>`. Dates in the query are slash-formatted
//! (`YYYY/MM/DD`) — Gmail silently ignores dash-formatted operands.

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

const LIST_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages";
const PAGE_SIZE: u32 = 25;
const MIN_CALL_SPACING: Duration = Duration::from_millis(200);

pub struct GmailSource {
    client: reqwest::Client,
    throttle: Throttle,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    id: String,
    #[serde(default)]
    snippet: String,
    /// Epoch milliseconds as text. Passed through untouched; the validator
    /// owns timestamp normalization.
    internal_date: Option<String>,
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

impl MessageDetail {
    fn header(&self, name: &str) -> String {
        self.payload
            .as_ref()
            .and_then(|p| {
                p.headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case(name))
                    .map(|h| h.value.clone())
            })
            .unwrap_or_default()
    }
}

impl GmailSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            throttle: Throttle::new(MIN_CALL_SPACING),
        }
    }

    /// Builds the `q=` operand for a single UTC day.
    fn day_query(target_day: DateTime<Utc>) -> String {
        let (start, end) = utc_day_bounds(target_day);
        format!(
            "after:{} before:{}",
            start.format("%Y/%m/%d"),
            end.format("%Y/%m/%d")
        )
    }

    async fn fetch_detail(
        &self,
        access_token: &str,
        id: &str,
    ) -> Result<Option<MessageDetail>, SourceError> {
        self.throttle.wait().await;
        let url = format!("{LIST_URL}/{id}");
        let payload = fetch_json_with_retry("gmail", || {
            self.client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("format", "metadata")])
                .query(&[("metadataHeaders", "Subject"), ("metadataHeaders", "From")])
        })
        .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_value::<MessageDetail>(payload) {
            Ok(detail) => Ok(Some(detail)),
            Err(e) => {
                warn!("gmail message {id} had unexpected shape: {e}");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl MessageSource for GmailSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Gmail
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
        let mut params = vec![("maxResults", PAGE_SIZE.to_string())];
        if let Some(day) = target_day {
            params.push(("q", Self::day_query(day)));
        }

        let payload = fetch_json_with_retry("gmail", || {
            self.client
                .get(LIST_URL)
                .bearer_auth(access_token)
                .query(&params)
        })
        .await?;

        let Some(payload) = payload else {
            return Ok(vec![]);
        };
        let list: MessageList = match serde_json::from_value(payload) {
            Ok(l) => l,
            Err(e) => {
                warn!("gmail message list had unexpected shape: {e}");
                return Ok(vec![]);
            }
        };

        let mut messages = Vec::with_capacity(list.messages.len());
        for message_ref in &list.messages {
            let Some(detail) = self.fetch_detail(access_token, &message_ref.id).await? else {
                continue;
            };
            messages.push(RawMessage {
                id: detail.id.clone(),
                subject: detail.header("Subject"),
                sender: detail.header("From"),
                body: detail.snippet.clone(),
                timestamp: NativeTimestamp::EpochMillis(
                    detail.internal_date.clone().unwrap_or_default(),
                ),
            });
        }

        debug!("gmail fetch returned {} messages", messages.len());
        Ok(messages)
    }
}
