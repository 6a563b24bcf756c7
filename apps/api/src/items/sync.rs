//! The sync pipeline: fetch → validate → dedup → classify → persist.
//!
//! Messages are processed in fixed-size batches, concurrent within a batch
//! and strictly sequential across batches, which bounds how many classifier
//! calls are ever in flight. One message failing never takes down its batch;
//! every failure mode ends in a `SyncOutcome` the caller can render.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::QueryCache;
use crate::classifier::Classifier;
use crate::credentials::CredentialStore;
use crate::errors::AppError;
use crate::events::{DashboardEvent, EventBus};
use crate::items::dates::{parse_target_date, same_utc_day};
use crate::items::store::{ItemStore, NewWorkItem};
use crate::items::validate::{effective_body, is_valid_raw, parse_native_timestamp};
use crate::sources::{MessageSource, RawMessage, SourceError, SourceKind};

/// Upper bound on concurrent classifier calls.
const BATCH_SIZE: usize = 3;

/// Per-run result summary. Always produced, even on total failure, so the
/// caller renders one shape regardless of what went wrong.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub created: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// Everything the pipeline needs, injected so tests can swap each seam.
#[derive(Clone)]
pub struct SyncDeps {
    pub store: Arc<dyn ItemStore>,
    pub classifier: Arc<dyn Classifier>,
    pub credentials: Arc<dyn CredentialStore>,
    pub cache: Arc<QueryCache>,
    pub events: EventBus,
}

enum MessageOutcome {
    Created,
    Skipped,
    Errored,
}

/// Runs one sync for `(user, source)`, optionally scoped to a target day.
///
/// An unparseable `target_date` downgrades to an unscoped sync rather than
/// failing the request. A missing or rejected credential is a run-level
/// failure: the outcome carries `errors: 1` and nothing was fetched.
pub async fn run_sync(
    deps: &SyncDeps,
    source: Arc<dyn MessageSource>,
    user_id: i64,
    target_date: Option<&str>,
) -> Result<SyncOutcome, AppError> {
    let sync_id = Uuid::new_v4();
    let kind = source.kind();

    let target_day = match target_date {
        Some(raw) => {
            let parsed = parse_target_date(raw);
            if parsed.is_none() {
                debug!("unparseable target date {raw:?}; syncing without a day filter");
            }
            parsed
        }
        None => None,
    };

    let token = deps.credentials.access_token(user_id, kind).await?;
    let Some(token) = token else {
        warn!("sync {sync_id}: user {user_id} has no {} credential", kind.as_str());
        return Ok(finish(deps, user_id, sync_id, SyncOutcome { errors: 1, ..Default::default() }));
    };

    let messages = match source.fetch(&token, target_day).await {
        Ok(messages) => messages,
        Err(SourceError::AuthExpired(name)) => {
            warn!("sync {sync_id}: {name} credential expired for user {user_id}");
            return Ok(finish(deps, user_id, sync_id, SyncOutcome { errors: 1, ..Default::default() }));
        }
    };

    if messages.is_empty() {
        return Ok(finish(deps, user_id, sync_id, SyncOutcome::default()));
    }

    let candidates = select_candidates(messages, target_day);
    let total = candidates.len() as u32;
    info!(
        "sync {sync_id}: {} {} candidates for user {user_id}",
        total,
        kind.as_str()
    );

    let mut outcome = SyncOutcome::default();
    let mut processed = 0u32;

    for batch in candidates.chunks(BATCH_SIZE) {
        let mut tasks: JoinSet<MessageOutcome> = JoinSet::new();
        for (message, source_date) in batch.iter().cloned() {
            let deps = deps.clone();
            tasks.spawn(async move {
                process_message(&deps, kind, user_id, message, source_date).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(MessageOutcome::Created) => outcome.created += 1,
                Ok(MessageOutcome::Skipped) => outcome.skipped += 1,
                Ok(MessageOutcome::Errored) => outcome.errors += 1,
                Err(e) => {
                    warn!("sync {sync_id}: worker panicked: {e}");
                    outcome.errors += 1;
                }
            }
        }
        processed += batch.len() as u32;
        deps.events.emit(DashboardEvent::SyncProgress {
            user_id,
            sync_id,
            processed,
            total,
        });
    }

    Ok(finish(deps, user_id, sync_id, outcome))
}

/// Structural validation plus day matching.
///
/// With a target day, a message only survives if its timestamp parses AND
/// lands on that UTC day — an unparseable timestamp cannot be matched to a
/// day. Without one, unparseable timestamps are kept and stored undated.
fn select_candidates(
    messages: Vec<RawMessage>,
    target_day: Option<DateTime<Utc>>,
) -> Vec<(RawMessage, Option<DateTime<Utc>>)> {
    messages
        .into_iter()
        .filter(is_valid_raw)
        .filter_map(|message| {
            let parsed = parse_native_timestamp(&message.timestamp);
            match (target_day, parsed) {
                (Some(day), Some(ts)) if same_utc_day(ts, day) => Some((message, parsed)),
                (Some(_), _) => None,
                (None, _) => Some((message, parsed)),
            }
        })
        .collect()
}

async fn process_message(
    deps: &SyncDeps,
    kind: SourceKind,
    user_id: i64,
    message: RawMessage,
    source_date: Option<DateTime<Utc>>,
) -> MessageOutcome {
    // Fast path: don't spend a classifier call on a known duplicate. The
    // unique index behind insert_if_absent is the authoritative gate.
    match deps.store.exists(user_id, kind.as_str(), &message.id).await {
        Ok(true) => return MessageOutcome::Skipped,
        Ok(false) => {}
        Err(e) => {
            warn!("dedup check failed for {}: {e}", message.id);
            return MessageOutcome::Errored;
        }
    }

    let content = effective_body(&message);
    let analysis = match deps.classifier.classify(&content, kind).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("classification failed for {}: {e}", message.id);
            return MessageOutcome::Errored;
        }
    };

    let inserted = deps
        .store
        .insert_if_absent(NewWorkItem {
            user_id,
            source: kind.as_str().to_string(),
            source_id: message.id.clone(),
            source_date,
            analysis,
        })
        .await;

    match inserted {
        Ok(Some(item)) => {
            deps.cache.invalidate_user(user_id);
            deps.events.emit(DashboardEvent::ItemCreated {
                user_id,
                item_id: item.id,
            });
            MessageOutcome::Created
        }
        // A concurrent sync won the insert race; same as a duplicate.
        Ok(None) => MessageOutcome::Skipped,
        Err(e) => {
            warn!("persist failed for {}: {e}", message.id);
            MessageOutcome::Errored
        }
    }
}

fn finish(deps: &SyncDeps, user_id: i64, sync_id: Uuid, outcome: SyncOutcome) -> SyncOutcome {
    deps.events.emit(DashboardEvent::SyncComplete {
        user_id,
        sync_id,
        created: outcome.created,
        skipped: outcome.skipped,
        errors: outcome.errors,
    });
    outcome
}
