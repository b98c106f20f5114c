use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sales_funnel_pipeline::configuration::PipelineSettings;
use sales_funnel_pipeline::domain::CanonicalMessage;
use sales_funnel_pipeline::domain::DealStatus;
use sales_funnel_pipeline::domain::Fingerprint;
use sales_funnel_pipeline::domain::IdempotencyRow;
use sales_funnel_pipeline::domain::IdempotencyStatus;
use sales_funnel_pipeline::domain::SenderAddress;
use sales_funnel_pipeline::domain::TaskStatus;
use sales_funnel_pipeline::domain::TenantId;
use sales_funnel_pipeline::llm::Classification;
use sales_funnel_pipeline::llm::EmailCategory;
use sales_funnel_pipeline::llm::ExtractionResult;
use sales_funnel_pipeline::llm::LlmClient;
use sales_funnel_pipeline::llm::LlmError;
use sales_funnel_pipeline::mailbox::MailboxClient;
use sales_funnel_pipeline::mailbox::MailboxError;
use sales_funnel_pipeline::mailbox::MailboxLabel;
use sales_funnel_pipeline::persistence::DealPatch;
use sales_funnel_pipeline::persistence::ExtractedCandidates;
use sales_funnel_pipeline::persistence::Page;
use sales_funnel_pipeline::persistence::PageCursor;
use sales_funnel_pipeline::persistence::PersistenceError;
use sales_funnel_pipeline::persistence::PersistenceStore;
use sales_funnel_pipeline::persistence::PurgeCounts;
use sales_funnel_pipeline::persistence::SavedIds;
use sales_funnel_pipeline::persistence::TaskPatch;
use sales_funnel_pipeline::pipeline::PipelineEngine;
use sales_funnel_pipeline::pipeline::PipelineOutcome;

struct StubMailbox;

#[async_trait]
impl MailboxClient for StubMailbox {
    async fn list_labels(
        &self,
        _tenant_id: &TenantId,
    ) -> Result<Vec<MailboxLabel>, MailboxError> {
        Ok(vec![])
    }

    async fn fetch_since(
        &self,
        _tenant_id: &TenantId,
        _label_ids: &[String],
        _since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<CanonicalMessage>, MailboxError> {
        Ok(vec![])
    }

    async fn mark_seen(
        &self,
        _tenant_id: &TenantId,
        _message_id: &str,
    ) -> Result<(), MailboxError> {
        Ok(())
    }
}

struct StubLlm {
    category: EmailCategory,
    extraction: ExtractionResult,
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn classify(
        &self,
        _message: &CanonicalMessage,
        _tenant_id: &TenantId,
    ) -> Result<Classification, LlmError> {
        Ok(Classification { category: self.category, confidence: 0.9, reasoning: "stub".to_string(), tokens_used: Some(42) })
    }

    async fn classify_batch(
        &self,
        messages: &[CanonicalMessage],
        _tenant_id: &TenantId,
    ) -> Result<Vec<Classification>, LlmError> {
        Ok(messages.iter().map(|_| Classification { category: self.category, confidence: 0.9, reasoning: "stub".to_string(), tokens_used: Some(42) }).collect())
    }

    async fn extract(
        &self,
        _message: &CanonicalMessage,
    ) -> Result<ExtractionResult, LlmError> {
        Ok(self.extraction.clone())
    }

    fn model_identifier(&self) -> &str { "stub/stub-model" }
}

#[derive(Default)]
struct InMemoryPersistence {
    processed: Mutex<Vec<String>>,
    saved: Mutex<Vec<ExtractedCandidates>>,
    rows: Mutex<Vec<IdempotencyRow>>,
}

#[async_trait]
impl PersistenceStore for InMemoryPersistence {
    async fn save_extracted(
        &self,
        _tenant_id: &TenantId,
        candidates: ExtractedCandidates,
        idempotency_row: IdempotencyRow,
    ) -> Result<SavedIds, PersistenceError> {
        let key = idempotency_row.fingerprint.to_string();
        let mut processed = self.processed.lock().unwrap();
        if processed.contains(&key) {
            return Err(PersistenceError::IdempotencyWriteError);
        }
        processed.push(key);
        let saved = SavedIds {
            task_ids: candidates.tasks.iter().map(|t| t.id).collect(),
            deal_ids: candidates.deals.iter().map(|d| d.id).collect(),
            contact_ids: candidates.contacts.iter().map(|c| c.id).collect(),
        };
        self.saved.lock().unwrap().push(candidates);
        self.rows.lock().unwrap().push(idempotency_row);
        Ok(saved)
    }

    async fn has_processed(
        &self,
        _tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<bool, PersistenceError> {
        Ok(self.processed.lock().unwrap().contains(&fingerprint.to_string()))
    }

    async fn get_idempotency(
        &self,
        _tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IdempotencyRow>, PersistenceError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.fingerprint == *fingerprint).cloned())
    }

    async fn list_tasks(
        &self,
        _tenant_id: &TenantId,
        _status: Option<TaskStatus>,
        _cursor: Option<PageCursor>,
        _limit: u32,
    ) -> Result<Page<sales_funnel_pipeline::domain::Task>, PersistenceError> {
        Ok(Page { items: vec![], next_cursor: None })
    }

    async fn list_deals(
        &self,
        _tenant_id: &TenantId,
        _status: Option<DealStatus>,
        _cursor: Option<PageCursor>,
        _limit: u32,
    ) -> Result<Page<sales_funnel_pipeline::domain::Deal>, PersistenceError> {
        Ok(Page { items: vec![], next_cursor: None })
    }

    async fn list_contacts(
        &self,
        _tenant_id: &TenantId,
        _cursor: Option<PageCursor>,
        _limit: u32,
    ) -> Result<Page<sales_funnel_pipeline::domain::Contact>, PersistenceError> {
        Ok(Page { items: vec![], next_cursor: None })
    }

    async fn update_task(
        &self,
        _tenant_id: &TenantId,
        _task_id: uuid::Uuid,
        _patch: TaskPatch,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn update_deal(
        &self,
        _tenant_id: &TenantId,
        _deal_id: uuid::Uuid,
        _patch: DealPatch,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn purge_tenant(
        &self,
        _tenant_id: &TenantId,
        _include_idempotency: bool,
    ) -> Result<PurgeCounts, PersistenceError> {
        Ok(PurgeCounts::default())
    }

    async fn expire_idempotency_rows(
        &self,
        _ttl_days: i64,
    ) -> Result<u64, PersistenceError> {
        Ok(0)
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        confidence_threshold: 0.5,
        poll_period_minutes: 5,
        max_messages_per_poll: 50,
        batch_size: 20,
        first_sync_timezone: "UTC".to_string(),
        prefilter_max_content_length: 5000,
        idempotency_ttl_days: 30,
        polling_enabled: true,
    }
}

fn message(body: &str) -> CanonicalMessage {
    CanonicalMessage {
        message_id: "m1".to_string(),
        subject: "Proposal for logistics contract".to_string(),
        sender_address: SenderAddress::parse("buyer@external.example").unwrap(),
        sender_display_name: Some("Buyer".to_string()),
        text_body: body.to_string(),
        received_at: Utc::now(),
    }
}

fn task_json(
    title: &str,
    confidence: f64,
) -> serde_json::Value {
    serde_json::json!({"title": title, "priority": "high", "confidence": confidence, "snippet": "as discussed"})
}

#[tokio::test]
async fn not_sales_relevant_messages_are_skipped_before_extraction() {
    let mailbox = Arc::new(StubMailbox);
    let llm = Arc::new(StubLlm { category: EmailCategory::SpamNoise, extraction: ExtractionResult::default() });
    let persistence = Arc::new(InMemoryPersistence::default());
    let engine = PipelineEngine::new(mailbox, llm, persistence.clone(), settings());

    let tenant = TenantId::new("tenant-a");
    let outcome = engine.process_message(&tenant, &message("Unsubscribe from our newsletter now")).await;

    assert!(matches!(outcome, PipelineOutcome::NotSalesRelevant { .. }));
    assert!(persistence.saved.lock().unwrap().is_empty());

    // Even a message the pipeline declines to extract from gets an
    // idempotency anchor, so a re-poll never reclassifies it again.
    let rows = persistence.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, IdempotencyStatus::Skipped);
}

#[tokio::test]
async fn candidates_below_confidence_threshold_are_persisted_as_draft() {
    let mailbox = Arc::new(StubMailbox);
    let llm = Arc::new(StubLlm { category: EmailCategory::SalesLead, extraction: ExtractionResult { tasks: vec![task_json("Follow up", 0.1)], deals: vec![], tokens_used: None } });
    let persistence = Arc::new(InMemoryPersistence::default());
    let engine = PipelineEngine::new(mailbox, llm, persistence.clone(), settings());

    let tenant = TenantId::new("tenant-a");
    let outcome = engine
        .process_message(
            &tenant,
            &message(
                "We would like to request a quote for your logistics service, discuss a contract, and schedule a follow up call with your team regarding pricing and delivery timelines.",
            ),
        )
        .await;

    assert!(matches!(outcome, PipelineOutcome::Persisted { task_count: 1, deal_count: 0, .. }));
    let saved = persistence.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].tasks[0].status, TaskStatus::Draft);
}

#[tokio::test]
async fn sales_relevant_candidates_above_threshold_are_persisted() {
    let mailbox = Arc::new(StubMailbox);
    let llm = Arc::new(StubLlm { category: EmailCategory::SalesLead, extraction: ExtractionResult { tasks: vec![task_json("Send proposal by Friday", 0.9)], deals: vec![], tokens_used: Some(10) } });
    let persistence = Arc::new(InMemoryPersistence::default());
    let engine = PipelineEngine::new(mailbox, llm, persistence.clone(), settings());

    let tenant = TenantId::new("tenant-a");
    let body = "We would like to request a quote for your logistics service, discuss a contract, and schedule a follow up call regarding pricing.";
    let outcome = engine.process_message(&tenant, &message(body)).await;

    assert!(matches!(outcome, PipelineOutcome::Persisted { task_count: 1, deal_count: 0, contact_count: 1 }));
    let saved = persistence.saved.lock().unwrap();
    assert_eq!(saved[0].tasks[0].status, TaskStatus::Accepted);
    drop(saved);

    // A second run of the identical message must be reported as already processed,
    // not persisted twice.
    let replay = engine.process_message(&tenant, &message(body)).await;
    assert!(matches!(replay, PipelineOutcome::AlreadyProcessed));
    assert_eq!(persistence.saved.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn prefilter_rejection_still_writes_an_idempotency_anchor() {
    let mailbox = Arc::new(StubMailbox);
    let llm = Arc::new(StubLlm { category: EmailCategory::SalesLead, extraction: ExtractionResult::default() });
    let persistence = Arc::new(InMemoryPersistence::default());
    let engine = PipelineEngine::new(mailbox, llm, persistence.clone(), settings());

    let tenant = TenantId::new("tenant-a");
    // Too short to survive the prefilter.
    let outcome = engine.process_message(&tenant, &message("ok")).await;

    assert!(matches!(outcome, PipelineOutcome::Skipped { stage: "prefilter", .. }));
    assert_eq!(persistence.rows.lock().unwrap().len(), 1);
}
