use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Canonical UTC day bounds for a timestamp: midnight of the timestamp's
/// **UTC** calendar day, and midnight of the following day.
///
/// The UTC calendar day is used deliberately (not the server's local day):
/// message timestamps are compared in UTC throughout the system, so a day
/// window built from local fields would drift by the server's offset.
pub fn utc_day_bounds(date: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.date_naive().and_time(NaiveTime::MIN));
    (start, start + Duration::hours(24))
}

/// Parses a caller-supplied target date ("2025-07-25" or full RFC 3339).
///
/// Returns `None` on anything unparseable — callers treat that as "no date
/// filter" rather than rejecting the request.
pub fn parse_target_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
}

/// True when both timestamps fall on the same UTC calendar day.
pub fn same_utc_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_bounds_span_exactly_24h() {
        let (start, end) = utc_day_bounds(ts("2025-07-24T13:45:12.345Z"));
        assert_eq!(end - start, Duration::hours(24));
    }

    #[test]
    fn test_start_is_utc_midnight() {
        let (start, _) = utc_day_bounds(ts("2025-07-24T23:59:59Z"));
        assert_eq!(start.hour(), 0);
        assert_eq!(start.minute(), 0);
        assert_eq!(start.second(), 0);
        assert_eq!(start.timestamp_subsec_millis(), 0);
    }

    #[test]
    fn test_bounds_use_utc_calendar_day() {
        // 01:30 with a +05:00 offset is 20:30 UTC on the *previous* day.
        let input = DateTime::parse_from_rfc3339("2025-07-25T01:30:00+05:00")
            .unwrap()
            .with_timezone(&Utc);
        let (start, end) = utc_day_bounds(input);
        assert_eq!(start, ts("2025-07-24T00:00:00Z"));
        assert_eq!(end, ts("2025-07-25T00:00:00Z"));
    }

    #[test]
    fn test_parse_plain_date() {
        assert_eq!(
            parse_target_date("2025-07-25"),
            Some(ts("2025-07-25T00:00:00Z"))
        );
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        assert_eq!(
            parse_target_date("2025-07-25T10:00:00+02:00"),
            Some(ts("2025-07-25T08:00:00Z"))
        );
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert_eq!(parse_target_date("not-a-date"), None);
        assert_eq!(parse_target_date(""), None);
        assert_eq!(parse_target_date("2025-13-45"), None);
    }

    #[test]
    fn test_same_utc_day() {
        assert!(same_utc_day(
            ts("2025-07-24T00:00:00Z"),
            ts("2025-07-24T23:59:59Z")
        ));
        assert!(!same_utc_day(
            ts("2025-07-24T23:59:59Z"),
            ts("2025-07-25T00:00:00Z")
        ));
    }
}
