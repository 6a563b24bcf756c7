use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::QueryCache;
use crate::errors::AppError;
use crate::events::DashboardEvent;
use crate::items::filters;
use crate::items::store::ListQuery;
use crate::items::sync::{run_sync, SyncOutcome};
use crate::items::validate::is_valid_stored;
use crate::models::item::WorkItem;
use crate::sources::SourceKind;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub user_id: i64,
    pub source: String,
    pub target_date: Option<String>,
}

/// POST /api/v1/sync
pub async fn handle_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncOutcome>, AppError> {
    if req.user_id <= 0 {
        return Err(AppError::Validation("user_id must be positive".to_string()));
    }
    let kind = SourceKind::parse(&req.source)
        .ok_or_else(|| AppError::Validation(format!("unknown source '{}'", req.source)))?;
    let source = state.sources.get(kind);
    let outcome = run_sync(
        &state.sync_deps(),
        source,
        req.user_id,
        req.target_date.as_deref(),
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: i64,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub classification: Option<String>,
    pub is_completed: Option<bool>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// GET /api/v1/items
pub async fn handle_list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<WorkItem>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);
    let start = parse_bound(params.start.as_deref(), "start")?;
    let end = parse_bound(params.end.as_deref(), "end")?;
    let date = filters::build(start, end, Utc::now())?;

    let key = QueryCache::key(
        params.user_id,
        limit,
        offset,
        params.classification.as_deref(),
        params.is_completed,
        start,
        end,
    );
    if let Some(items) = state.cache.get(&key) {
        return Ok(Json(items));
    }

    let items = state
        .store
        .list(&ListQuery {
            user_id: params.user_id,
            limit,
            offset,
            classification: params.classification.clone(),
            is_completed: params.is_completed,
            date,
        })
        .await?;
    // Corrupt rows are dropped from the response, not turned into a 500.
    let items: Vec<WorkItem> = items.into_iter().filter(is_valid_stored).collect();

    state.cache.put(key, items.clone());
    Ok(Json(items))
}

/// Strict bound parsing for the read API: a malformed bound is the caller's
/// bug, unlike a sync target date, which downgrades to unfiltered.
fn parse_bound(raw: Option<&str>, name: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    crate::items::dates::parse_target_date(raw)
        .map(Some)
        .ok_or_else(|| AppError::Validation(format!("'{name}' is not a valid date: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub user_id: i64,
    pub is_completed: bool,
}

/// PATCH /api/v1/items/:id/complete
pub async fn handle_complete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<WorkItem>, AppError> {
    let updated = state
        .store
        .set_completed(req.user_id, id, req.is_completed)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {id} not found")))?;
    state.cache.invalidate_user(req.user_id);
    state.events.emit(DashboardEvent::ItemUpdated {
        user_id: req.user_id,
        item_id: id,
    });
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct SnoozeRequest {
    pub user_id: i64,
    /// `None` clears an existing snooze.
    pub snooze_until: Option<DateTime<Utc>>,
}

/// PATCH /api/v1/items/:id/snooze
pub async fn handle_snooze_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SnoozeRequest>,
) -> Result<Json<WorkItem>, AppError> {
    let updated = state
        .store
        .set_snoozed(req.user_id, id, req.snooze_until)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {id} not found")))?;
    state.cache.invalidate_user(req.user_id);
    state.events.emit(DashboardEvent::ItemUpdated {
        user_id: req.user_id,
        item_id: id,
    });
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::classifier::{Analysis, Classifier, ClassifierError};
    use crate::credentials::CredentialStore;
    use crate::events::EventBus;
    use crate::items::store::{ItemStore, NewWorkItem};
    use crate::sources::{MessageSource, RawMessage, SourceError};
    use crate::state::SourceSet;

    /// Store that serves an empty list and counts how often it is asked.
    #[derive(Default)]
    struct CountingStore {
        list_calls: AtomicU32,
    }

    #[async_trait]
    impl ItemStore for CountingStore {
        async fn exists(&self, _: i64, _: &str, _: &str) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn insert_if_absent(&self, _: NewWorkItem) -> Result<Option<WorkItem>, AppError> {
            Ok(None)
        }
        async fn list(&self, _: &ListQuery) -> Result<Vec<WorkItem>, AppError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
        async fn set_completed(
            &self,
            _: i64,
            _: i64,
            _: bool,
        ) -> Result<Option<WorkItem>, AppError> {
            Ok(None)
        }
        async fn set_snoozed(
            &self,
            _: i64,
            _: i64,
            _: Option<DateTime<Utc>>,
        ) -> Result<Option<WorkItem>, AppError> {
            Ok(None)
        }
    }

    struct NoClassifier;

    #[async_trait]
    impl Classifier for NoClassifier {
        async fn classify(&self, _: &str, _: SourceKind) -> Result<Analysis, ClassifierError> {
            Err(ClassifierError::EmptyContent)
        }
    }

    struct NoCredentials;

    #[async_trait]
    impl CredentialStore for NoCredentials {
        async fn access_token(&self, _: i64, _: SourceKind) -> Result<Option<String>, AppError> {
            Ok(None)
        }
    }

    struct EmptySource(SourceKind);

    #[async_trait]
    impl MessageSource for EmptySource {
        fn kind(&self) -> SourceKind {
            self.0
        }
        async fn fetch(
            &self,
            _: &str,
            _: Option<DateTime<Utc>>,
        ) -> Result<Vec<RawMessage>, SourceError> {
            Ok(vec![])
        }
    }

    fn test_state(store: Arc<CountingStore>) -> AppState {
        AppState {
            store,
            classifier: Arc::new(NoClassifier),
            credentials: Arc::new(NoCredentials),
            cache: Arc::new(QueryCache::new()),
            events: EventBus::new(),
            sources: SourceSet::new(
                Arc::new(EmptySource(SourceKind::Gmail)),
                Arc::new(EmptySource(SourceKind::Slack)),
            ),
        }
    }

    fn list_params(user_id: i64) -> ListParams {
        ListParams {
            user_id,
            limit: None,
            offset: None,
            classification: None,
            is_completed: None,
            start: None,
            end: None,
        }
    }

    #[tokio::test]
    async fn test_repeated_list_is_served_from_cache() {
        let store = Arc::new(CountingStore::default());
        let state = test_state(store.clone());

        handle_list_items(State(state.clone()), Query(list_params(1)))
            .await
            .unwrap();
        handle_list_items(State(state), Query(list_params(1)))
            .await
            .unwrap();

        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let state = test_state(Arc::new(CountingStore::default()));
        let mut params = list_params(1);
        params.start = Some("2025-07-26".to_string());
        params.end = Some("2025-07-25".to_string());

        let result = handle_list_items(State(state), Query(params)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_malformed_bound_is_rejected() {
        let state = test_state(Arc::new(CountingStore::default()));
        let mut params = list_params(1);
        params.start = Some("yesterday".to_string());

        let result = handle_list_items(State(state), Query(params)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_sync_rejects_unknown_source() {
        let state = test_state(Arc::new(CountingStore::default()));
        let result = handle_sync(
            State(state),
            Json(SyncRequest {
                user_id: 1,
                source: "carrier-pigeon".to_string(),
                target_date: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
