use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::DealPatch;
use super::ExtractedCandidates;
use super::Page;
use super::PageCursor;
use super::PersistenceError;
use super::PersistenceStore;
use super::PurgeCounts;
use super::SavedIds;
use super::TaskPatch;
use crate::domain::Contact;
use crate::domain::ContactSource;
use crate::domain::Currency;
use crate::domain::Deal;
use crate::domain::DealStage;
use crate::domain::DealStatus;
use crate::domain::Fingerprint;
use crate::domain::IdempotencyRow;
use crate::domain::IdempotencyStatus;
use crate::domain::Priority;
use crate::domain::SenderAddress;
use crate::domain::Task;
use crate::domain::TaskStatus;
use crate::domain::TenantId;

pub struct PgPersistenceStore {
    pool: PgPool,
}

impl PgPersistenceStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl PersistenceStore for PgPersistenceStore {
    #[tracing::instrument(skip(self, candidates, idempotency_row), fields(%tenant_id, fingerprint = %idempotency_row.fingerprint, tasks = candidates.tasks.len(), deals = candidates.deals.len(), contacts = candidates.contacts.len()))]
    async fn save_extracted(
        &self,
        tenant_id: &TenantId,
        candidates: ExtractedCandidates,
        idempotency_row: IdempotencyRow,
    ) -> Result<SavedIds, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        // contacts -> tasks -> deals -> idempotency anchor. The anchor is
        // written last: if anything above fails the transaction rolls back
        // and a retried poll sees no anchor, so it retries the whole batch.
        // The ids recorded on the anchor, and returned to the caller, are
        // collected from what is actually inserted here, not echoed back
        // from whatever the caller happened to ask for (§4.F).
        let mut contact_ids = Vec::with_capacity(candidates.contacts.len());
        for contact in &candidates.contacts {
            sqlx::query!(
                r#"
                INSERT INTO contacts (id, tenant_id, email, display_name, source, last_contact_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (tenant_id, email) DO UPDATE SET
                    last_contact_at = GREATEST(contacts.last_contact_at, EXCLUDED.last_contact_at)
                "#,
                contact.id,
                tenant_id.as_ref(),
                contact.email.as_ref(),
                contact.display_name,
                contact_source_str(contact.source),
                contact.last_contact_at,
                contact.created_at,
            )
            .execute(&mut *tx)
            .await?;
            contact_ids.push(contact.id);
        }

        let mut task_ids = Vec::with_capacity(candidates.tasks.len());
        for task in &candidates.tasks {
            sqlx::query!(
                r#"
                INSERT INTO tasks
                    (id, tenant_id, title, priority, status, confidence, agent, audit_snippet, source_fingerprint, due_at, assignee_id, created_at, updated_at)
                VALUES
                    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
                task.id,
                tenant_id.as_ref(),
                task.title,
                priority_str(task.priority),
                task_status_str(task.status),
                task.confidence,
                task.agent,
                task.audit_snippet,
                task.source_fingerprint.to_string(),
                task.due_at,
                task.assignee_id,
                task.created_at,
                task.updated_at,
            )
            .execute(&mut *tx)
            .await?;
            task_ids.push(task.id);
        }

        let mut deal_ids = Vec::with_capacity(candidates.deals.len());
        for deal in &candidates.deals {
            sqlx::query!(
                r#"
                INSERT INTO deals
                    (id, tenant_id, title, value, currency, stage, probability, status, confidence, agent, audit_snippet, source_fingerprint, created_at, updated_at)
                VALUES
                    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
                deal.id,
                tenant_id.as_ref(),
                deal.title,
                deal.value,
                deal.currency.code(),
                deal_stage_str(deal.stage),
                deal.probability as i16,
                deal_status_str(deal.status),
                deal.confidence,
                deal.agent,
                deal.audit_snippet,
                deal.source_fingerprint.to_string(),
                deal.created_at,
                deal.updated_at,
            )
            .execute(&mut *tx)
            .await?;
            deal_ids.push(deal.id);
        }

        let rows = sqlx::query!(
            r#"
            INSERT INTO processed_messages
                (tenant_id, fingerprint, original_message_id, subject, sender_address, processed_at, status, classifier_verdict, tokens_used, processing_ms, task_ids, deal_ids)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT DO NOTHING
            "#,
            tenant_id.as_ref(),
            idempotency_row.fingerprint.to_string(),
            idempotency_row.original_message_id,
            idempotency_row.subject,
            idempotency_row.sender_address.as_ref(),
            idempotency_row.processed_at,
            idempotency_status_str(idempotency_row.status),
            idempotency_row.classifier_verdict,
            idempotency_row.tokens_used,
            idempotency_row.processing_ms,
            &task_ids,
            &deal_ids,
        )
        .execute(&mut *tx)
        .await?;

        if rows.rows_affected() == 0 {
            // Another worker raced us to the same fingerprint; abandon this
            // write rather than double-insert the entities above.
            return Err(PersistenceError::IdempotencyWriteError);
        }

        tx.commit().await?;
        Ok(SavedIds { task_ids, deal_ids, contact_ids })
    }

    async fn has_processed(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, PersistenceError> {
        let row = sqlx::query!(
            "SELECT 1 as present FROM processed_messages WHERE tenant_id = $1 AND fingerprint = $2",
            tenant_id.as_ref(),
            fingerprint.to_string(),
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn get_idempotency(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IdempotencyRow>, PersistenceError> {
        let row = sqlx::query!(
            r#"
            SELECT fingerprint, original_message_id, subject, sender_address, processed_at,
                   status, classifier_verdict, tokens_used, processing_ms, task_ids, deal_ids
            FROM processed_messages
            WHERE tenant_id = $1 AND fingerprint = $2
            "#,
            tenant_id.as_ref(),
            fingerprint.to_string(),
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IdempotencyRow {
            fingerprint: Fingerprint::from_hex(&r.fingerprint).expect("stored fingerprint was valid hex at write time"),
            tenant_id: tenant_id.clone(),
            original_message_id: r.original_message_id,
            subject: r.subject,
            sender_address: SenderAddress::parse(r.sender_address).expect("stored address was valid at write time"),
            processed_at: r.processed_at,
            status: parse_idempotency_status(&r.status),
            classifier_verdict: r.classifier_verdict,
            tokens_used: r.tokens_used,
            processing_ms: r.processing_ms,
            task_ids: r.task_ids.unwrap_or_default(),
            deal_ids: r.deal_ids.unwrap_or_default(),
            ttl_unix: 0,
        }))
    }

    async fn list_tasks(
        &self,
        tenant_id: &TenantId,
        status: Option<TaskStatus>,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<Page<Task>, PersistenceError> {
        let (before, before_id) = cursor.map(|c| (c.created_before, c.id)).unwrap_or((chrono::Utc::now(), Uuid::nil()));
        let status_filter = status.map(task_status_str);
        let rows = sqlx::query!(
            r#"
            SELECT id, title, priority, status, confidence, agent, audit_snippet, source_fingerprint, due_at, assignee_id, created_at, updated_at
            FROM tasks
            WHERE tenant_id = $1 AND (created_at, id) < ($2, $3) AND ($4::text IS NULL OR status = $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
            tenant_id.as_ref(),
            before,
            before_id,
            status_filter,
            (limit + 1) as i64,
        )
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as u32 > limit;
        let mut items: Vec<Task> = rows
            .into_iter()
            .take(limit as usize)
            .map(|r| Task {
                id: r.id,
                tenant_id: tenant_id.clone(),
                title: r.title,
                priority: parse_priority(&r.priority),
                status: parse_task_status(&r.status),
                confidence: r.confidence,
                agent: r.agent,
                audit_snippet: r.audit_snippet,
                source_fingerprint: Fingerprint::from_hex(&r.source_fingerprint).expect("stored fingerprint was valid hex at write time"),
                due_at: r.due_at,
                assignee_id: r.assignee_id,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();

        let next_cursor = if has_more { items.last().map(|t| PageCursor { created_before: t.created_at, id: t.id }) } else { None };
        items.truncate(limit as usize);
        Ok(Page { items, next_cursor })
    }

    async fn list_deals(
        &self,
        tenant_id: &TenantId,
        status: Option<DealStatus>,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<Page<Deal>, PersistenceError> {
        let (before, before_id) = cursor.map(|c| (c.created_before, c.id)).unwrap_or((chrono::Utc::now(), Uuid::nil()));
        let status_filter = status.map(deal_status_str);
        let rows = sqlx::query!(
            r#"
            SELECT id, title, value, currency, stage, probability, status, confidence, agent, audit_snippet, source_fingerprint, created_at, updated_at
            FROM deals
            WHERE tenant_id = $1 AND (created_at, id) < ($2, $3) AND ($4::text IS NULL OR status = $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
            tenant_id.as_ref(),
            before,
            before_id,
            status_filter,
            (limit + 1) as i64,
        )
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as u32 > limit;
        let mut items: Vec<Deal> = rows
            .into_iter()
            .take(limit as usize)
            .map(|r| Deal {
                id: r.id,
                tenant_id: tenant_id.clone(),
                title: r.title,
                value: r.value,
                currency: parse_currency(&r.currency),
                stage: parse_deal_stage(&r.stage),
                probability: r.probability as u8,
                status: parse_deal_status(&r.status),
                confidence: r.confidence,
                agent: r.agent,
                audit_snippet: r.audit_snippet,
                source_fingerprint: Fingerprint::from_hex(&r.source_fingerprint).expect("stored fingerprint was valid hex at write time"),
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();

        let next_cursor = if has_more { items.last().map(|d| PageCursor { created_before: d.created_at, id: d.id }) } else { None };
        items.truncate(limit as usize);
        Ok(Page { items, next_cursor })
    }

    async fn list_contacts(
        &self,
        tenant_id: &TenantId,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<Page<Contact>, PersistenceError> {
        let (before, before_id) = cursor.map(|c| (c.created_before, c.id)).unwrap_or((chrono::Utc::now(), Uuid::nil()));
        let rows = sqlx::query!(
            r#"
            SELECT id, email, display_name, source, last_contact_at, created_at
            FROM contacts
            WHERE tenant_id = $1 AND (created_at, id) < ($2, $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
            tenant_id.as_ref(),
            before,
            before_id,
            (limit + 1) as i64,
        )
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as u32 > limit;
        let mut items: Vec<Contact> = rows
            .into_iter()
            .take(limit as usize)
            .map(|r| Contact {
                id: r.id,
                tenant_id: tenant_id.clone(),
                email: SenderAddress::parse(r.email).expect("stored address was valid at write time"),
                display_name: r.display_name,
                source: parse_contact_source(&r.source),
                last_contact_at: r.last_contact_at,
                created_at: r.created_at,
            })
            .collect();

        let next_cursor = if has_more { items.last().map(|c| PageCursor { created_before: c.created_at, id: c.id }) } else { None };
        items.truncate(limit as usize);
        Ok(Page { items, next_cursor })
    }

    async fn update_task(
        &self,
        tenant_id: &TenantId,
        task_id: Uuid,
        patch: TaskPatch,
    ) -> Result<(), PersistenceError> {
        let status_str = patch.status.map(task_status_str);
        sqlx::query!(
            r#"
            UPDATE tasks SET
                status = COALESCE($1, status),
                due_at = CASE WHEN $2 THEN $3 ELSE due_at END,
                assignee_id = CASE WHEN $4 THEN $5 ELSE assignee_id END,
                updated_at = now()
            WHERE tenant_id = $6 AND id = $7
            "#,
            status_str,
            patch.due_at.is_some(),
            patch.due_at.flatten(),
            patch.assignee_id.is_some(),
            patch.assignee_id.flatten(),
            tenant_id.as_ref(),
            task_id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_deal(
        &self,
        tenant_id: &TenantId,
        deal_id: Uuid,
        patch: DealPatch,
    ) -> Result<(), PersistenceError> {
        let status_str = patch.status.map(deal_status_str);
        let stage_str = patch.stage.map(deal_stage_str);
        sqlx::query!(
            r#"
            UPDATE deals SET
                status = COALESCE($1, status),
                stage = COALESCE($2, stage),
                value = COALESCE($3, value),
                probability = COALESCE($4, probability),
                updated_at = now()
            WHERE tenant_id = $5 AND id = $6
            "#,
            status_str,
            stage_str,
            patch.value,
            patch.probability.map(|p| p as i16),
            tenant_id.as_ref(),
            deal_id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_tenant(
        &self,
        tenant_id: &TenantId,
        include_idempotency: bool,
    ) -> Result<PurgeCounts, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let tasks = sqlx::query!("DELETE FROM tasks WHERE tenant_id = $1", tenant_id.as_ref()).execute(&mut *tx).await?.rows_affected();
        let deals = sqlx::query!("DELETE FROM deals WHERE tenant_id = $1", tenant_id.as_ref()).execute(&mut *tx).await?.rows_affected();
        let contacts = sqlx::query!("DELETE FROM contacts WHERE tenant_id = $1", tenant_id.as_ref()).execute(&mut *tx).await?.rows_affected();
        let idempotency_rows = if include_idempotency {
            sqlx::query!("DELETE FROM processed_messages WHERE tenant_id = $1", tenant_id.as_ref()).execute(&mut *tx).await?.rows_affected()
        } else {
            0
        };
        tx.commit().await?;
        Ok(PurgeCounts { tasks, deals, contacts, idempotency_rows })
    }

    async fn expire_idempotency_rows(
        &self,
        ttl_days: i64,
    ) -> Result<u64, PersistenceError> {
        let result = sqlx::query!(
            r#"
            DELETE FROM processed_messages
            WHERE now() - processed_at > make_interval(days => $1)
            "#,
            ttl_days as f64,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn contact_source_str(s: ContactSource) -> &'static str {
    match s {
        ContactSource::Manual => "manual",
        ContactSource::EmailExtraction => "email_extraction",
    }
}

fn parse_contact_source(s: &str) -> ContactSource {
    match s {
        "manual" => ContactSource::Manual,
        _ => ContactSource::EmailExtraction,
    }
}

fn priority_str(p: Priority) -> &'static str {
    match p {
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}

fn parse_priority(s: &str) -> Priority {
    match s {
        "high" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

fn task_status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Draft => "draft",
        TaskStatus::Accepted => "accepted",
        TaskStatus::Rejected => "rejected",
        TaskStatus::Completed => "completed",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "accepted" => TaskStatus::Accepted,
        "rejected" => TaskStatus::Rejected,
        "completed" => TaskStatus::Completed,
        _ => TaskStatus::Draft,
    }
}

fn deal_stage_str(s: DealStage) -> &'static str {
    match s {
        DealStage::Lead => "lead",
        DealStage::Contacted => "contacted",
        DealStage::Demo => "demo",
        DealStage::Proposal => "proposal",
        DealStage::Negotiation => "negotiation",
        DealStage::ClosedWon => "closed_won",
        DealStage::ClosedLost => "closed_lost",
    }
}

fn parse_deal_stage(s: &str) -> DealStage {
    match s {
        "contacted" => DealStage::Contacted,
        "demo" => DealStage::Demo,
        "proposal" => DealStage::Proposal,
        "negotiation" => DealStage::Negotiation,
        "closed_won" => DealStage::ClosedWon,
        "closed_lost" => DealStage::ClosedLost,
        _ => DealStage::Lead,
    }
}

fn deal_status_str(s: DealStatus) -> &'static str {
    match s {
        DealStatus::Draft => "draft",
        DealStatus::Accepted => "accepted",
        DealStatus::Rejected => "rejected",
        DealStatus::Won => "won",
        DealStatus::Lost => "lost",
    }
}

fn parse_deal_status(s: &str) -> DealStatus {
    match s {
        "accepted" => DealStatus::Accepted,
        "rejected" => DealStatus::Rejected,
        "won" => DealStatus::Won,
        "lost" => DealStatus::Lost,
        _ => DealStatus::Draft,
    }
}

fn parse_currency(s: &str) -> Currency { s.parse().unwrap_or_default() }

fn idempotency_status_str(s: IdempotencyStatus) -> &'static str {
    match s {
        IdempotencyStatus::Processed => "processed",
        IdempotencyStatus::Failed => "failed",
        IdempotencyStatus::Skipped => "skipped",
    }
}

fn parse_idempotency_status(s: &str) -> IdempotencyStatus {
    match s {
        "failed" => IdempotencyStatus::Failed,
        "skipped" => IdempotencyStatus::Skipped,
        _ => IdempotencyStatus::Processed,
    }
}
