//! Structural validation for messages entering the pipeline and for stored
//! rows on their way back out.

use chrono::{DateTime, Utc};

use crate::models::item::WorkItem;
use crate::sources::{NativeTimestamp, RawMessage};

/// Body text used when a message arrives with no content of its own.
/// Automated senders (calendar invites, build bots) legitimately post
/// empty-body messages; they are never dropped for that alone.
const EMPTY_BODY_PLACEHOLDER: &str = "(no content)";

/// Normalizes a source-native timestamp to UTC.
///
/// Each wire format gets its own parser, with generic RFC 3339 parsing as
/// the shared fallback; the first parse that yields a valid instant wins.
/// `None` means the raw text is unusable — the caller decides whether that
/// drops the message (day-scoped sync) or just blanks the date.
pub fn parse_native_timestamp(timestamp: &NativeTimestamp) -> Option<DateTime<Utc>> {
    match timestamp {
        NativeTimestamp::EpochMillis(raw) => parse_epoch_millis(raw).or_else(|| parse_rfc3339(raw)),
        NativeTimestamp::EpochSeconds(raw) => {
            parse_epoch_seconds(raw).or_else(|| parse_rfc3339(raw))
        }
        NativeTimestamp::Rfc3339(raw) => parse_rfc3339(raw).or_else(|| parse_epoch_millis(raw)),
    }
}

fn parse_epoch_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

fn parse_epoch_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let seconds: f64 = raw.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((seconds * 1000.0) as i64)
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Minimal structural validity for a fetched message: it must carry its
/// source-native id, or nothing downstream can deduplicate it.
pub fn is_valid_raw(message: &RawMessage) -> bool {
    !message.id.trim().is_empty()
}

/// The content handed to the classifier. Empty bodies fall back to the
/// subject line, then to a literal placeholder.
pub fn effective_body(message: &RawMessage) -> String {
    if !message.body.trim().is_empty() {
        return message.body.clone();
    }
    if !message.subject.trim().is_empty() {
        return message.subject.clone();
    }
    EMPTY_BODY_PLACEHOLDER.to_string()
}

/// Defensive check on rows read back from storage: a corrupt row is
/// filtered out of the response instead of failing the whole read.
pub fn is_valid_stored(item: &WorkItem) -> bool {
    item.id > 0 && item.user_id > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            subject: subject.to_string(),
            sender: "sender@example.com".to_string(),
            body: body.to_string(),
            timestamp: NativeTimestamp::EpochMillis("1753351200000".to_string()),
        }
    }

    #[test]
    fn test_epoch_millis_parses() {
        let parsed =
            parse_native_timestamp(&NativeTimestamp::EpochMillis("1753351200000".to_string()));
        assert_eq!(
            parsed.map(|dt| dt.to_rfc3339()),
            Some("2025-07-24T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_epoch_seconds_with_fraction_parses() {
        let parsed =
            parse_native_timestamp(&NativeTimestamp::EpochSeconds("1753351200.500".to_string()));
        assert_eq!(
            parsed.map(|dt| dt.timestamp_millis()),
            Some(1_753_351_200_500)
        );
    }

    #[test]
    fn test_rfc3339_parses() {
        let parsed = parse_native_timestamp(&NativeTimestamp::Rfc3339(
            "2025-07-24T10:00:00+02:00".to_string(),
        ));
        assert_eq!(
            parsed.map(|dt| dt.to_rfc3339()),
            Some("2025-07-24T08:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_millis_variant_falls_back_to_rfc3339() {
        // Some upstream proxies rewrite internalDate into an ISO string.
        let parsed = parse_native_timestamp(&NativeTimestamp::EpochMillis(
            "2025-07-24T10:00:00Z".to_string(),
        ));
        assert!(parsed.is_some());
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(
            parse_native_timestamp(&NativeTimestamp::EpochMillis("soon".to_string())),
            None
        );
        assert_eq!(
            parse_native_timestamp(&NativeTimestamp::EpochSeconds(String::new())),
            None
        );
        assert_eq!(
            parse_native_timestamp(&NativeTimestamp::EpochSeconds("NaN".to_string())),
            None
        );
    }

    #[test]
    fn test_raw_message_needs_an_id() {
        assert!(is_valid_raw(&raw("m1", "Subject", "Body")));
        assert!(!is_valid_raw(&raw("", "Subject", "Body")));
        assert!(!is_valid_raw(&raw("   ", "Subject", "Body")));
    }

    #[test]
    fn test_effective_body_prefers_body() {
        assert_eq!(effective_body(&raw("m1", "Reminder", "The text")), "The text");
    }

    #[test]
    fn test_empty_body_falls_back_to_subject() {
        assert_eq!(effective_body(&raw("m1", "Reminder", "   ")), "Reminder");
    }

    #[test]
    fn test_empty_message_gets_placeholder() {
        assert_eq!(effective_body(&raw("m1", "", "")), "(no content)");
    }

    #[test]
    fn test_stored_item_needs_positive_ids() {
        let mut item = sample_item();
        assert!(is_valid_stored(&item));
        item.id = 0;
        assert!(!is_valid_stored(&item));
        item.id = 7;
        item.user_id = -3;
        assert!(!is_valid_stored(&item));
    }

    fn sample_item() -> WorkItem {
        WorkItem {
            id: 1,
            user_id: 1,
            source: "gmail".to_string(),
            source_id: "m1".to_string(),
            source_date: None,
            classification: "fyi".to_string(),
            summary: String::new(),
            action_items: vec![],
            sentiment: "neutral".to_string(),
            urgency_score: 3,
            effort_estimate: "quick".to_string(),
            deadline: "none".to_string(),
            context_tags: vec![],
            stakeholders: vec![],
            business_impact: "low".to_string(),
            follow_up_needed: false,
            is_completed: false,
            is_snoozed: false,
            snooze_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
