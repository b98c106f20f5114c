mod postgres;

pub use postgres::PgPersistenceStore;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Contact;
use crate::domain::Deal;
use crate::domain::DealStage;
use crate::domain::DealStatus;
use crate::domain::Fingerprint;
use crate::domain::IdempotencyRow;
use crate::domain::Task;
use crate::domain::TaskStatus;
use crate::domain::TenantId;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("idempotency write was not the first for this fingerprint")]
    IdempotencyWriteError,
}

/// What a single extraction run produced, ready to be written as one unit
/// (§4.F), alongside the idempotency row that anchors the write.
#[derive(Debug, Clone, Default)]
pub struct ExtractedCandidates {
    pub tasks: Vec<Task>,
    pub deals: Vec<Deal>,
    pub contacts: Vec<Contact>,
}

/// Opaque cursor for tenant-scoped list pagination. Backed by `(created_at,
/// id)` under the hood so pagination stays stable under concurrent writes.
#[derive(Debug, Clone)]
pub struct PageCursor {
    pub created_before: chrono::DateTime<chrono::Utc>,
    pub id: Uuid,
}

pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<PageCursor>,
}

/// Patch accepted by [`PersistenceStore::update_task`]. An outer `None`
/// means "leave this field alone"; an inner `None` on `due_at`/`assignee_id`
/// clears the field (§4.F: "mutate the small fixed set of allowed fields").
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub assignee_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Default)]
pub struct DealPatch {
    pub status: Option<DealStatus>,
    pub stage: Option<DealStage>,
    pub value: Option<i64>,
    pub probability: Option<u8>,
}

/// Per-entity counts returned by [`PersistenceStore::purge_tenant`] (§4.F).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PurgeCounts {
    pub tasks: u64,
    pub deals: u64,
    pub contacts: u64,
    pub idempotency_rows: u64,
}

/// What [`PersistenceStore::save_extracted`] actually committed, as opposed
/// to what the caller asked it to write (§4.F: "each sub-write is
/// independent; failures are logged and the sub-write is skipped ... returns
/// the list of IDs actually written"). The idempotency row's `task_ids`/
/// `deal_ids` are populated from this, not from the candidates the engine
/// handed in, so a partial write is never misreported as complete.
#[derive(Debug, Clone, Default)]
pub struct SavedIds {
    pub task_ids: Vec<Uuid>,
    pub deal_ids: Vec<Uuid>,
    pub contact_ids: Vec<Uuid>,
}

/// A key/value-ish store keyed by tenant, realized over PostgreSQL (§4.F,
/// §6). Every write that mutates more than one table for one fingerprint is
/// wrapped in a single transaction, with the idempotency row written last:
/// on success it attests the pipeline ran for that fingerprint; on failure
/// it is never written, so a retried poll will re-attempt the whole batch.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Writes contacts, then tasks, then deals, then `idempotency_row`, all
    /// in one transaction. Used for every terminal pipeline outcome, not
    /// only ones that extracted something: `candidates` is simply empty for
    /// a message that was skipped or classified away, and `idempotency_row`
    /// still anchors that outcome so it is never retried (§7). Returns the
    /// IDs actually committed (§4.F), which the caller uses to finish
    /// building its own record of what happened rather than assuming
    /// everything it asked for landed.
    async fn save_extracted(
        &self,
        tenant_id: &TenantId,
        candidates: ExtractedCandidates,
        idempotency_row: IdempotencyRow,
    ) -> Result<SavedIds, PersistenceError>;

    async fn has_processed(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, PersistenceError>;

    async fn get_idempotency(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IdempotencyRow>, PersistenceError>;

    async fn list_tasks(
        &self,
        tenant_id: &TenantId,
        status: Option<TaskStatus>,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<Page<Task>, PersistenceError>;

    async fn list_deals(
        &self,
        tenant_id: &TenantId,
        status: Option<DealStatus>,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<Page<Deal>, PersistenceError>;

    async fn list_contacts(
        &self,
        tenant_id: &TenantId,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<Page<Contact>, PersistenceError>;

    async fn update_task(
        &self,
        tenant_id: &TenantId,
        task_id: Uuid,
        patch: TaskPatch,
    ) -> Result<(), PersistenceError>;

    async fn update_deal(
        &self,
        tenant_id: &TenantId,
        deal_id: Uuid,
        patch: DealPatch,
    ) -> Result<(), PersistenceError>;

    /// Deletes every record owned by `tenant_id` across tasks, deals, and
    /// contacts, and the idempotency log too when `include_idempotency` is
    /// set (§4.F). Disconnect passes `true`; ordinary test cleanup passes
    /// `false` so a subsequent resubmission of the same mail is still
    /// recognized as already processed.
    async fn purge_tenant(
        &self,
        tenant_id: &TenantId,
        include_idempotency: bool,
    ) -> Result<PurgeCounts, PersistenceError>;

    /// Drops idempotency rows older than `ttl_days`, called from the
    /// background expiry sweep (§6 `idempotency_ttl_days`).
    async fn expire_idempotency_rows(
        &self,
        ttl_days: i64,
    ) -> Result<u64, PersistenceError>;
}
