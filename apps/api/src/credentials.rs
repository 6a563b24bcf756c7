//! Access-token lookup for connected accounts.
//!
//! Token acquisition and refresh live in the OAuth service; this side only
//! ever reads the current token, and an absent row simply means the user
//! never connected that source.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::sources::SourceKind;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current access token for `(user, source)`, or `None` when the source
    /// was never connected.
    async fn access_token(
        &self,
        user_id: i64,
        source: SourceKind,
    ) -> Result<Option<String>, AppError>;
}

/// Reads tokens from the `connected_accounts` table.
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn access_token(
        &self,
        user_id: i64,
        source: SourceKind,
    ) -> Result<Option<String>, AppError> {
        let token: Option<String> = sqlx::query_scalar(
            "SELECT access_token FROM connected_accounts WHERE user_id = $1 AND source = $2",
        )
        .bind(user_id)
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }
}
