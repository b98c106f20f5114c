mod postgres;

pub use postgres::PgTokenStore;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use secrecy::Secret;
use thiserror::Error;

use crate::domain::TenantId;

#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("no stored token for tenant")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// OAuth token pair for one tenant's mailbox connection (§4.A). Never
/// logged or serialized in full; `Secret` keeps the raw strings out of
/// tracing spans and `Debug` output.
#[derive(Clone)]
pub struct StoredToken {
    pub tenant_id: TenantId,
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredToken {
    /// Treats a token as expired 5 minutes before its real expiry, so a
    /// refresh has time to complete before the mailbox provider rejects it.
    pub fn needs_refresh(&self) -> bool { Utc::now() >= self.expires_at - Duration::minutes(5) }
}

/// Owns the tenant -> OAuth token mapping. One row per tenant; a put
/// always overwrites (§4.A has no versioning requirement).
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn put(
        &self,
        token: StoredToken,
    ) -> Result<(), TokenStoreError>;

    async fn get(
        &self,
        tenant_id: &TenantId,
    ) -> Result<StoredToken, TokenStoreError>;

    async fn delete(
        &self,
        tenant_id: &TenantId,
    ) -> Result<(), TokenStoreError>;

    async fn list_tenants(&self) -> Result<Vec<TenantId>, TokenStoreError>;
}
