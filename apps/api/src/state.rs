use std::sync::Arc;

use crate::cache::QueryCache;
use crate::classifier::Classifier;
use crate::credentials::CredentialStore;
use crate::events::EventBus;
use crate::items::store::ItemStore;
use crate::items::sync::SyncDeps;
use crate::sources::{MessageSource, SourceKind};

/// Shared application state injected into all route handlers via Axum
/// extractors. Every collaborator sits behind a trait object so tests can
/// swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ItemStore>,
    pub classifier: Arc<dyn Classifier>,
    pub credentials: Arc<dyn CredentialStore>,
    pub cache: Arc<QueryCache>,
    pub events: EventBus,
    pub sources: SourceSet,
}

/// The connected message platforms, one client per source kind.
#[derive(Clone)]
pub struct SourceSet {
    gmail: Arc<dyn MessageSource>,
    slack: Arc<dyn MessageSource>,
}

impl SourceSet {
    pub fn new(gmail: Arc<dyn MessageSource>, slack: Arc<dyn MessageSource>) -> Self {
        Self { gmail, slack }
    }

    pub fn get(&self, kind: SourceKind) -> Arc<dyn MessageSource> {
        match kind {
            SourceKind::Gmail => self.gmail.clone(),
            SourceKind::Slack => self.slack.clone(),
        }
    }
}

impl AppState {
    /// The pipeline's view of this state.
    pub fn sync_deps(&self) -> SyncDeps {
        SyncDeps {
            store: self.store.clone(),
            classifier: self.classifier.clone(),
            credentials: self.credentials.clone(),
            cache: self.cache.clone(),
            events: self.events.clone(),
        }
    }
}
