//! Work-item persistence.
//!
//! The `(user_id, source, source_id)` unique index is what actually
//! prevents duplicates: `insert_if_absent` rides on `ON CONFLICT DO
//! NOTHING`, so two concurrent syncs racing past the `exists` fast path
//! still produce exactly one row. `exists` is kept only to skip the
//! classifier call on known duplicates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::classifier::Analysis;
use crate::errors::AppError;
use crate::items::filters::DateFilter;
use crate::models::item::WorkItem;

/// Fields for a work item about to be created.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub user_id: i64,
    pub source: String,
    pub source_id: String,
    pub source_date: Option<DateTime<Utc>>,
    pub analysis: Analysis,
}

/// Parameters for one list read. All filters combine via AND.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub user_id: i64,
    pub limit: i64,
    pub offset: i64,
    pub classification: Option<String>,
    pub is_completed: Option<bool>,
    pub date: DateFilter,
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point lookup on the dedup triple.
    async fn exists(&self, user_id: i64, source: &str, source_id: &str) -> Result<bool, AppError>;

    /// Inserts the item unless its dedup triple already exists. Returns the
    /// stored row, or `None` when another writer got there first.
    async fn insert_if_absent(&self, item: NewWorkItem) -> Result<Option<WorkItem>, AppError>;

    async fn list(&self, query: &ListQuery) -> Result<Vec<WorkItem>, AppError>;

    async fn set_completed(
        &self,
        user_id: i64,
        id: i64,
        is_completed: bool,
    ) -> Result<Option<WorkItem>, AppError>;

    async fn set_snoozed(
        &self,
        user_id: i64,
        id: i64,
        snooze_until: Option<DateTime<Utc>>,
    ) -> Result<Option<WorkItem>, AppError>;
}

pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn exists(&self, user_id: i64, source: &str, source_id: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM work_items WHERE user_id = $1 AND source = $2 AND source_id = $3)",
        )
        .bind(user_id)
        .bind(source)
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_if_absent(&self, item: NewWorkItem) -> Result<Option<WorkItem>, AppError> {
        let NewWorkItem {
            user_id,
            source,
            source_id,
            source_date,
            analysis,
        } = item;
        let inserted: Option<WorkItem> = sqlx::query_as(
            r#"
            INSERT INTO work_items
                (user_id, source, source_id, source_date,
                 classification, summary, action_items, sentiment, urgency_score,
                 effort_estimate, deadline, context_tags, stakeholders,
                 business_impact, follow_up_needed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (user_id, source, source_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&source)
        .bind(&source_id)
        .bind(source_date)
        .bind(&analysis.classification)
        .bind(&analysis.summary)
        .bind(&analysis.action_items)
        .bind(&analysis.sentiment)
        .bind(analysis.urgency_score)
        .bind(&analysis.effort_estimate)
        .bind(&analysis.deadline)
        .bind(&analysis.context_tags)
        .bind(&analysis.stakeholders)
        .bind(&analysis.business_impact)
        .bind(analysis.follow_up_needed)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<WorkItem>, AppError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM work_items WHERE user_id = ");
        qb.push_bind(query.user_id);
        if let Some(classification) = &query.classification {
            qb.push(" AND classification = ").push_bind(classification);
        }
        if let Some(is_completed) = query.is_completed {
            qb.push(" AND is_completed = ").push_bind(is_completed);
        }
        query.date.push_sql(&mut qb);
        qb.push(" ORDER BY urgency_score DESC, created_at DESC LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        let items = qb.build_query_as::<WorkItem>().fetch_all(&self.pool).await?;
        Ok(items)
    }

    async fn set_completed(
        &self,
        user_id: i64,
        id: i64,
        is_completed: bool,
    ) -> Result<Option<WorkItem>, AppError> {
        let updated: Option<WorkItem> = sqlx::query_as(
            r#"
            UPDATE work_items
            SET is_completed = $3, updated_at = NOW()
            WHERE id = $2 AND user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(id)
        .bind(is_completed)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn set_snoozed(
        &self,
        user_id: i64,
        id: i64,
        snooze_until: Option<DateTime<Utc>>,
    ) -> Result<Option<WorkItem>, AppError> {
        let updated: Option<WorkItem> = sqlx::query_as(
            r#"
            UPDATE work_items
            SET is_snoozed = $3, snooze_until = $4, updated_at = NOW()
            WHERE id = $2 AND user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(id)
        .bind(snooze_until.is_some())
        .bind(snooze_until)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }
}
