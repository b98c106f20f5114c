mod gmail_like;
mod mime;

pub use gmail_like::GmailLikeClient;
pub use mime::decode_mime;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;

use crate::domain::CanonicalMessage;
use crate::domain::TenantId;

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("mailbox authorization expired")]
    AuthExpired,
    #[error("transient fetch failure: {0}")]
    TransientFetchError(String),
    #[error("malformed MIME payload: {0}")]
    MalformedMessage(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// One mailbox label/folder, as the provider names and identifies it
/// (§4.B).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MailboxLabel {
    pub id: String,
    pub name: String,
}

/// Abstracts over a mailbox provider (§4.B). Implementations translate a
/// provider's wire format into [`CanonicalMessage`]s; nothing above this
/// trait knows the provider exists.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    async fn list_labels(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<MailboxLabel>, MailboxError>;

    /// Messages under any of `label_ids` received strictly after `since`,
    /// oldest first, capped at `limit`. Implementations must page through
    /// the provider's API transparently; callers only ever see a flat,
    /// ordered list.
    async fn fetch_since(
        &self,
        tenant_id: &TenantId,
        label_ids: &[String],
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CanonicalMessage>, MailboxError>;

    async fn mark_seen(
        &self,
        tenant_id: &TenantId,
        message_id: &str,
    ) -> Result<(), MailboxError>;
}
