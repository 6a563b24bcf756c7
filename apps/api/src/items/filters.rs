//! Date predicates for work-item reads.
//!
//! A plain range filters on `source_date` alone. A single lower bound gets
//! special-cased: when it points at the current UTC day ("today" view) or
//! into the trailing week ("recent" view), ingestion time widens the match —
//! an item synced today whose origin message is older (processing lag,
//! delayed sync) still belongs in today's list. One policy, one builder;
//! every read goes through it.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::errors::AppError;
use crate::items::dates::same_utc_day;

/// Typed date predicate over stored work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    /// `source_date` present and within `[start, end)`. Undated items are
    /// excluded: an explicit range is a question about origin time.
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Same-day view: `source_date` **or** `created_at` within
    /// `[start, start+24h)`.
    TodayWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Trailing-week view: `source_date` **or** `created_at` within
    /// `[start, now+24h)`.
    RecentWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// `source_date` present and `>= start`.
    From(DateTime<Utc>),
    /// `source_date` present and `< end`.
    Before(DateTime<Utc>),
    /// No bounds supplied. Undated items are still excluded so that the
    /// unfiltered listing keeps a sort-stable, indexable basis.
    SourceDated,
}

/// Builds the date predicate for an optional `(start, end)` range.
///
/// Sub-cases for a lone `start` are tried in priority order: today, then
/// recent, then the general lower bound. An inverted range is a caller
/// error, never a best-effort interpretation.
pub fn build(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateFilter, AppError> {
    match (start, end) {
        (Some(start), Some(end)) => {
            if start >= end {
                return Err(AppError::Validation(
                    "start must be strictly earlier than end".to_string(),
                ));
            }
            Ok(DateFilter::Window { start, end })
        }
        (Some(start), None) => {
            if same_utc_day(start, now) {
                Ok(DateFilter::TodayWindow {
                    start,
                    end: start + Duration::hours(24),
                })
            } else if start <= now && start >= now - Duration::days(7) {
                Ok(DateFilter::RecentWindow {
                    start,
                    end: now + Duration::hours(24),
                })
            } else {
                Ok(DateFilter::From(start))
            }
        }
        (None, Some(end)) => Ok(DateFilter::Before(end)),
        (None, None) => Ok(DateFilter::SourceDated),
    }
}

impl DateFilter {
    /// Appends this predicate to a WHERE clause under construction.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match *self {
            DateFilter::Window { start, end } => {
                qb.push(" AND source_date >= ")
                    .push_bind(start)
                    .push(" AND source_date < ")
                    .push_bind(end);
            }
            DateFilter::TodayWindow { start, end } | DateFilter::RecentWindow { start, end } => {
                qb.push(" AND ((source_date >= ")
                    .push_bind(start)
                    .push(" AND source_date < ")
                    .push_bind(end)
                    .push(") OR (created_at >= ")
                    .push_bind(start)
                    .push(" AND created_at < ")
                    .push_bind(end)
                    .push("))");
            }
            DateFilter::From(start) => {
                qb.push(" AND source_date >= ").push_bind(start);
            }
            DateFilter::Before(end) => {
                qb.push(" AND source_date < ").push_bind(end);
            }
            DateFilter::SourceDated => {
                qb.push(" AND source_date IS NOT NULL");
            }
        }
    }
}

#[cfg(test)]
impl DateFilter {
    /// In-memory evaluation of the same predicate `push_sql` renders.
    /// Exists to pin the policy in unit tests without a database.
    fn matches(&self, source_date: Option<DateTime<Utc>>, created_at: DateTime<Utc>) -> bool {
        let in_window = |t: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>| {
            t >= start && t < end
        };
        match *self {
            DateFilter::Window { start, end } => {
                source_date.is_some_and(|d| in_window(d, start, end))
            }
            DateFilter::TodayWindow { start, end } | DateFilter::RecentWindow { start, end } => {
                source_date.is_some_and(|d| in_window(d, start, end))
                    || in_window(created_at, start, end)
            }
            DateFilter::From(start) => source_date.is_some_and(|d| d >= start),
            DateFilter::Before(end) => source_date.is_some_and(|d| d < end),
            DateFilter::SourceDated => source_date.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    const NOW: &str = "2025-07-25T15:00:00Z";

    #[test]
    fn test_both_bounds_build_a_window() {
        let f = build(
            Some(ts("2025-07-20T00:00:00Z")),
            Some(ts("2025-07-21T00:00:00Z")),
            ts(NOW),
        )
        .unwrap();
        assert!(matches!(f, DateFilter::Window { .. }));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let result = build(
            Some(ts("2025-07-21T00:00:00Z")),
            Some(ts("2025-07-20T00:00:00Z")),
            ts(NOW),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_equal_bounds_are_rejected() {
        let bound = ts("2025-07-21T00:00:00Z");
        let result = build(Some(bound), Some(bound), ts(NOW));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_start_on_current_day_selects_today_window() {
        let start = ts("2025-07-25T00:00:00Z");
        let f = build(Some(start), None, ts(NOW)).unwrap();
        assert_eq!(
            f,
            DateFilter::TodayWindow {
                start,
                end: ts("2025-07-26T00:00:00Z"),
            }
        );
    }

    #[test]
    fn test_start_in_trailing_week_selects_recent_window() {
        let start = ts("2025-07-22T00:00:00Z");
        let f = build(Some(start), None, ts(NOW)).unwrap();
        assert_eq!(
            f,
            DateFilter::RecentWindow {
                start,
                end: ts("2025-07-26T15:00:00Z"),
            }
        );
    }

    #[test]
    fn test_start_older_than_a_week_is_general_lower_bound() {
        let start = ts("2025-07-10T00:00:00Z");
        let f = build(Some(start), None, ts(NOW)).unwrap();
        assert_eq!(f, DateFilter::From(start));
    }

    #[test]
    fn test_future_start_is_general_lower_bound() {
        let start = ts("2025-08-01T00:00:00Z");
        let f = build(Some(start), None, ts(NOW)).unwrap();
        assert_eq!(f, DateFilter::From(start));
    }

    #[test]
    fn test_today_takes_precedence_over_recent() {
        // Start earlier today also sits inside the trailing week; the
        // same-day check wins.
        let start = ts("2025-07-25T08:00:00Z");
        let f = build(Some(start), None, ts(NOW)).unwrap();
        assert!(matches!(f, DateFilter::TodayWindow { .. }));
    }

    #[test]
    fn test_only_end_builds_upper_bound() {
        let end = ts("2025-07-20T00:00:00Z");
        let f = build(None, Some(end), ts(NOW)).unwrap();
        assert_eq!(f, DateFilter::Before(end));
    }

    #[test]
    fn test_no_bounds_requires_source_date() {
        let f = build(None, None, ts(NOW)).unwrap();
        assert_eq!(f, DateFilter::SourceDated);
        assert!(f.matches(Some(ts("2025-07-01T00:00:00Z")), ts(NOW)));
        assert!(!f.matches(None, ts(NOW)));
    }

    #[test]
    fn test_window_selects_exactly_the_in_range_item() {
        let f = build(
            Some(ts("2025-07-25T00:00:00Z")),
            Some(ts("2025-07-26T00:00:00Z")),
            ts(NOW),
        )
        .unwrap();
        let created = ts("2025-07-25T12:00:00Z");
        assert!(!f.matches(Some(ts("2025-07-24T10:00:00Z")), created));
        assert!(f.matches(Some(ts("2025-07-25T01:00:00Z")), created));
        assert!(!f.matches(None, created));
    }

    #[test]
    fn test_window_is_inclusive_start_exclusive_end() {
        let start = ts("2025-07-25T00:00:00Z");
        let end = ts("2025-07-26T00:00:00Z");
        let f = DateFilter::Window { start, end };
        let created = ts(NOW);
        assert!(f.matches(Some(start), created));
        assert!(!f.matches(Some(end), created));
    }

    #[test]
    fn test_today_window_includes_lagged_item_by_created_at() {
        // Origin message is from yesterday, but it was ingested today.
        let f = build(Some(ts("2025-07-25T00:00:00Z")), None, ts(NOW)).unwrap();
        let yesterday = ts("2025-07-24T18:00:00Z");
        let ingested_today = ts("2025-07-25T09:30:00Z");
        assert!(f.matches(Some(yesterday), ingested_today));
    }

    #[test]
    fn test_general_lower_bound_has_no_created_at_fallback() {
        // The same lagged item is excluded once the start is far enough back
        // to fall through to the general case.
        let f = DateFilter::From(ts("2025-07-25T00:00:00Z"));
        let yesterday = ts("2025-07-24T18:00:00Z");
        let ingested_today = ts("2025-07-25T09:30:00Z");
        assert!(!f.matches(Some(yesterday), ingested_today));
    }

    #[test]
    fn test_recent_window_includes_undated_item_ingested_in_window() {
        let f = build(Some(ts("2025-07-22T00:00:00Z")), None, ts(NOW)).unwrap();
        assert!(f.matches(None, ts("2025-07-23T11:00:00Z")));
        assert!(!f.matches(None, ts("2025-07-20T11:00:00Z")));
    }
}
