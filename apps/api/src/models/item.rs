use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A classified work item derived from one source message.
///
/// The `(user_id, source, source_id)` triple identifies the origin message
/// uniquely and is protected by a unique index in `work_items`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkItem {
    pub id: i64,
    pub user_id: i64,
    pub source: String,
    pub source_id: String,
    /// Timestamp of the origin message. `None` when the source sent nothing
    /// parseable; the record is kept, the date is dropped.
    pub source_date: Option<DateTime<Utc>>,
    pub classification: String,
    pub summary: String,
    pub action_items: Vec<String>,
    pub sentiment: String,
    pub urgency_score: i32,
    pub effort_estimate: String,
    pub deadline: String,
    pub context_tags: Vec<String>,
    pub stakeholders: Vec<String>,
    pub business_impact: String,
    pub follow_up_needed: bool,
    pub is_completed: bool,
    pub is_snoozed: bool,
    pub snooze_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
