use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;

use super::emit::EmitSink;
use super::emit::PipelineEvent;
use super::prefilter::prefilter;
use super::stages::ClassifyOutcome;
use super::stages::DemoOutcome;
use super::stages::ExtractionOutcome;
use super::stages::GatedCandidates;
use super::stages::PersistOutcome;
use super::stages::PipelineOutcome;
use crate::configuration::PipelineSettings;
use crate::domain::CanonicalMessage;
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
use crate::domain::Task;
use crate::domain::TaskStatus;
use crate::domain::TenantId;
use crate::llm::normalize_deal_candidate;
use crate::llm::normalize_indian_shorthand;
use crate::llm::normalize_task_candidate;
use crate::llm::EmailCategory;
use crate::llm::LlmClient;
use crate::llm::Parsed;
use crate::llm::RawDealCandidate;
use crate::llm::RawTaskCandidate;
use crate::mailbox::MailboxClient;
use crate::persistence::ExtractedCandidates;
use crate::persistence::PersistenceStore;

/// Default label scope for a poll: a tenant's inbox only, unless a future
/// caller widens this (§4.B, §4.C).
const DEFAULT_LABEL_IDS: &[&str] = &["INBOX"];

/// Summary of one poll's worth of work, handed back to the scheduler so it
/// can advance a tenant's cursor (§4.C/§4.D).
pub struct PollResult {
    pub message_count: usize,
    pub latest_received_at: Option<DateTime<Utc>>,
}

/// Wires the mailbox, LLM, and persistence collaborators into the
/// Classify -> Prefilter -> Extract -> ConfidenceGate -> Persist -> Emit
/// state machine (§4.D). Each stage is a pure function of the previous
/// stage's output type; nothing upstream can be read by mistake because
/// the type simply isn't there.
pub struct PipelineEngine {
    mailbox: Arc<dyn MailboxClient>,
    llm: Arc<dyn LlmClient>,
    persistence: Arc<dyn PersistenceStore>,
    emit: Arc<dyn EmitSink>,
    settings: PipelineSettings,
}

impl PipelineEngine {
    pub fn new(
        mailbox: Arc<dyn MailboxClient>,
        llm: Arc<dyn LlmClient>,
        persistence: Arc<dyn PersistenceStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self::with_emit_sink(mailbox, llm, persistence, Arc::new(super::emit::TracingEmitSink), settings)
    }

    pub fn with_emit_sink(
        mailbox: Arc<dyn MailboxClient>,
        llm: Arc<dyn LlmClient>,
        persistence: Arc<dyn PersistenceStore>,
        emit: Arc<dyn EmitSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self { mailbox, llm, persistence, emit, settings }
    }

    /// Fetches messages for `tenant_id` received since `since`, up to
    /// `limit`, and runs each through [`Self::process_message`]. Used by
    /// both the scheduled loop and a manual poll trigger, so the two paths
    /// can never diverge in behavior.
    #[tracing::instrument(skip(self), fields(%tenant_id, %since, limit))]
    pub async fn run_poll(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<PollResult, anyhow::Error> {
        let label_ids: Vec<String> = DEFAULT_LABEL_IDS.iter().map(|s| s.to_string()).collect();
        let messages = self.mailbox.fetch_since(tenant_id, &label_ids, since, limit).await?;
        let latest_received_at = messages.last().map(|m| m.received_at);
        let outcomes = self.process_batch(tenant_id, messages).await;

        for outcome in &outcomes {
            if let PipelineOutcome::Failed { stage, reason } = outcome {
                tracing::warn!(stage, reason, "message failed pipeline processing");
            }
        }

        Ok(PollResult { message_count: outcomes.len(), latest_received_at })
    }

    /// Runs the idempotency check per message, then classifies every
    /// surviving message in batches of [`PipelineSettings::batch_size`]
    /// through a single `classify_batch` call each, and carries each
    /// message the rest of the way through [`Self::continue_after_classify`]
    /// — the same continuation [`Self::process_message`] uses after its own
    /// single-message classify call, so the batched and sequential paths
    /// provably yield the same final database state (§4.D "Batched
    /// variant"). One message's or one chunk's failure never aborts the
    /// rest of the batch.
    pub async fn process_batch(
        &self,
        tenant_id: &TenantId,
        messages: Vec<CanonicalMessage>,
    ) -> Vec<PipelineOutcome> {
        let mut outcomes: Vec<Option<PipelineOutcome>> = messages.iter().map(|_| None).collect();
        let mut survivors: Vec<(usize, CanonicalMessage, Fingerprint, DateTime<Utc>)> = Vec::new();

        for (i, message) in messages.into_iter().enumerate() {
            let started_at = Utc::now();
            let fingerprint = Fingerprint::of(&message);
            match self.persistence.has_processed(tenant_id, &fingerprint).await {
                Ok(true) => outcomes[i] = Some(PipelineOutcome::AlreadyProcessed),
                Ok(false) => survivors.push((i, message, fingerprint, started_at)),
                Err(e) => outcomes[i] = Some(PipelineOutcome::Failed { stage: "idempotency_check", reason: e.to_string() }),
            }
        }

        let batch_size = self.settings.batch_size.max(1);
        for chunk in survivors.chunks(batch_size) {
            let chunk_messages: Vec<CanonicalMessage> = chunk.iter().map(|(_, m, _, _)| m.clone()).collect();

            match self.llm.classify_batch(&chunk_messages, tenant_id).await {
                Ok(classifications) => {
                    for ((i, message, fingerprint, started_at), classification) in chunk.iter().zip(classifications) {
                        let classify_outcome = match classification.category {
                            EmailCategory::SalesLead => ClassifyOutcome::SalesRelevant { classification },
                            _ => ClassifyOutcome::NotRelevant { classification },
                        };
                        outcomes[*i] = Some(self.continue_after_classify(tenant_id, message, *fingerprint, *started_at, classify_outcome).await);
                    }
                }
                Err(e) => {
                    // Fail open for the whole chunk, same posture as a
                    // single-message classify failure (§7).
                    let reason = e.to_string();
                    for (i, message, fingerprint, started_at) in chunk {
                        let row = self.build_row(tenant_id, message, *fingerprint, *started_at, IdempotencyStatus::Skipped, Some(format!("classifier_error: {reason}")), None, vec![], vec![]);
                        self.write_anchor_only(tenant_id, row).await;
                        self.emit_completed(tenant_id, message, 0, 0, 0).await;
                        outcomes[*i] = Some(PipelineOutcome::Skipped { stage: "classify", reason: reason.clone() });
                    }
                }
            }
        }

        outcomes.into_iter().map(|o| o.expect("every index is filled by either the idempotency check or the classify stage")).collect()
    }

    #[tracing::instrument(skip(self, message), fields(%tenant_id, message_id = %message.message_id))]
    pub async fn process_message(
        &self,
        tenant_id: &TenantId,
        message: &CanonicalMessage,
    ) -> PipelineOutcome {
        let started_at = Utc::now();
        let fingerprint = Fingerprint::of(message);

        match self.persistence.has_processed(tenant_id, &fingerprint).await {
            Ok(true) => return PipelineOutcome::AlreadyProcessed,
            Ok(false) => {}
            // Can't tell whether this fingerprint was already processed, so
            // don't risk a duplicate write; let the next poll try again.
            Err(e) => return PipelineOutcome::Failed { stage: "idempotency_check", reason: e.to_string() },
        }

        let classify_outcome = match self.classify(message, tenant_id).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                // Fail open: a classifier outage must not reclassify the
                // same message on every subsequent poll (§7).
                let row = self.build_row(tenant_id, message, fingerprint, started_at, IdempotencyStatus::Skipped, Some(format!("classifier_error: {reason}")), None, vec![], vec![]);
                self.write_anchor_only(tenant_id, row).await;
                self.emit_completed(tenant_id, message, 0, 0, 0).await;
                return PipelineOutcome::Skipped { stage: "classify", reason };
            }
        };

        self.continue_after_classify(tenant_id, message, fingerprint, started_at, classify_outcome).await
    }

    /// Everything that happens once a classification verdict exists for
    /// `message`, regardless of whether that verdict came from a
    /// single-message `classify` call ([`Self::process_message`]) or a
    /// batched `classify_batch` call ([`Self::process_batch`]).
    async fn continue_after_classify(
        &self,
        tenant_id: &TenantId,
        message: &CanonicalMessage,
        fingerprint: Fingerprint,
        started_at: DateTime<Utc>,
        classify_outcome: ClassifyOutcome,
    ) -> PipelineOutcome {
        let (classification, category) = match &classify_outcome {
            ClassifyOutcome::SalesRelevant { classification } => (classification.clone(), classification.category),
            ClassifyOutcome::NotRelevant { classification } => (classification.clone(), classification.category),
        };

        if !matches!(classify_outcome, ClassifyOutcome::SalesRelevant { .. }) {
            let row = self.build_row(tenant_id, message, fingerprint, started_at, IdempotencyStatus::Skipped, Some(format!("{category:?}")), classification.tokens_used, vec![], vec![]);
            self.write_anchor_only(tenant_id, row).await;
            self.emit_completed(tenant_id, message, 0, 0, 0).await;
            return PipelineOutcome::NotSalesRelevant { category: format!("{category:?}") };
        }
        tracing::debug!(confidence = classification.confidence, "classified as sales-relevant");

        let prefiltered = prefilter(message, self.settings.prefilter_max_content_length);
        let content = match prefiltered {
            super::stages::PrefilterOutcome::Passed { content } => content,
            super::stages::PrefilterOutcome::Skipped { reason } => {
                let row = self.build_row(tenant_id, message, fingerprint, started_at, IdempotencyStatus::Skipped, Some(format!("{category:?}")), classification.tokens_used, vec![], vec![]);
                self.write_anchor_only(tenant_id, row).await;
                self.emit_completed(tenant_id, message, 0, 0, 0).await;
                return PipelineOutcome::Skipped { stage: "prefilter", reason };
            }
        };

        let extraction_outcome = self.extract(message, &content, &fingerprint, tenant_id).await;
        let (tasks, deals, contacts, tokens_used) = match extraction_outcome {
            ExtractionOutcome::Extracted { tasks, deals, contacts, tokens_used } => (tasks, deals, contacts, tokens_used),
            ExtractionOutcome::Failed { reason } => {
                // A transport/throttle failure, not a content problem: no
                // row written, so the next poll retries this message.
                return PipelineOutcome::Failed { stage: "extract", reason };
            }
        };

        let gated = self.confidence_gate(tasks, deals, contacts);
        tracing::debug!(accepted = gated.accepted_count, draft = gated.draft_count, "partitioned candidates by confidence");

        let task_ids = gated.tasks.iter().map(|t| t.id).collect();
        let deal_ids = gated.deals.iter().map(|d| d.id).collect();
        let tokens_used = tokens_used.or(classification.tokens_used);
        let processing_ms = Some((Utc::now() - started_at).num_milliseconds());

        let row = IdempotencyRow::new(
            fingerprint,
            tenant_id.clone(),
            message.message_id.clone(),
            message.subject.clone(),
            message.sender_address.clone(),
            started_at,
            IdempotencyStatus::Processed,
            Some(format!("{category:?}")),
            tokens_used,
            processing_ms,
            task_ids,
            deal_ids,
            self.settings.idempotency_ttl_days,
        );

        let events = gated_events(tenant_id, &gated);
        match self.persist(tenant_id, gated, row).await {
            PersistOutcome::Persisted { task_count, deal_count, contact_count } => {
                for event in events {
                    self.emit.emit(event).await;
                }
                self.emit_completed(tenant_id, message, task_count, deal_count, contact_count).await;
                PipelineOutcome::Persisted { task_count, deal_count, contact_count }
            }
            PersistOutcome::AlreadyProcessed => PipelineOutcome::AlreadyProcessed,
            PersistOutcome::Rejected { reason } => PipelineOutcome::Failed { stage: "persist", reason },
        }
    }

    async fn emit_completed(
        &self,
        tenant_id: &TenantId,
        message: &CanonicalMessage,
        task_count: usize,
        deal_count: usize,
        contact_count: usize,
    ) {
        self.emit
            .emit(PipelineEvent::ProcessingCompleted { tenant_id: tenant_id.clone(), message_id: message.message_id.clone(), task_count, deal_count, contact_count })
            .await;
    }

    /// Runs Classify/Prefilter/Extract/ConfidenceGate for `message` without
    /// touching the idempotency log or the persistence store (§6 demo
    /// endpoint). Meant for "what would the pipeline do with this email"
    /// previews; nothing it produces is durable and no Emit event fires.
    pub async fn run_demo(
        &self,
        tenant_id: &TenantId,
        message: &CanonicalMessage,
    ) -> DemoOutcome {
        let fingerprint = Fingerprint::of(message);

        let classify_outcome = match self.classify(message, tenant_id).await {
            Ok(outcome) => outcome,
            Err(reason) => return DemoOutcome::Failed { stage: "classify", reason },
        };

        let (classification, category) = match &classify_outcome {
            ClassifyOutcome::SalesRelevant { classification } => (classification.clone(), classification.category),
            ClassifyOutcome::NotRelevant { classification } => (classification.clone(), classification.category),
        };

        if !matches!(classify_outcome, ClassifyOutcome::SalesRelevant { .. }) {
            return DemoOutcome::NotSalesRelevant { category: format!("{category:?}") };
        }
        let _ = classification;

        let content = match prefilter(message, self.settings.prefilter_max_content_length) {
            super::stages::PrefilterOutcome::Passed { content } => content,
            super::stages::PrefilterOutcome::Skipped { reason } => return DemoOutcome::Skipped { stage: "prefilter", reason },
        };

        let extraction_outcome = self.extract(message, &content, &fingerprint, tenant_id).await;
        let (tasks, deals, contacts, _tokens_used) = match extraction_outcome {
            ExtractionOutcome::Extracted { tasks, deals, contacts, tokens_used } => (tasks, deals, contacts, tokens_used),
            ExtractionOutcome::Failed { reason } => return DemoOutcome::Failed { stage: "extract", reason },
        };

        let gated = self.confidence_gate(tasks, deals, contacts);
        DemoOutcome::Previewed { category: format!("{category:?}"), tasks: gated.tasks, deals: gated.deals, contacts: gated.contacts }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_row(
        &self,
        tenant_id: &TenantId,
        message: &CanonicalMessage,
        fingerprint: Fingerprint,
        started_at: DateTime<Utc>,
        status: IdempotencyStatus,
        classifier_verdict: Option<String>,
        tokens_used: Option<i64>,
        task_ids: Vec<uuid::Uuid>,
        deal_ids: Vec<uuid::Uuid>,
    ) -> IdempotencyRow {
        let processing_ms = Some((Utc::now() - started_at).num_milliseconds());
        IdempotencyRow::new(
            fingerprint,
            tenant_id.clone(),
            message.message_id.clone(),
            message.subject.clone(),
            message.sender_address.clone(),
            started_at,
            status,
            classifier_verdict,
            tokens_used,
            processing_ms,
            task_ids,
            deal_ids,
            self.settings.idempotency_ttl_days,
        )
    }

    /// Writes just the anchor row, with no entities attached (§7: a message
    /// the pipeline deliberately declined to extract from still needs a
    /// fingerprint recorded, so a retry storm never happens).
    async fn write_anchor_only(
        &self,
        tenant_id: &TenantId,
        row: IdempotencyRow,
    ) {
        if let Err(e) = self.persistence.save_extracted(tenant_id, ExtractedCandidates::default(), row).await {
            tracing::warn!(error = %e, "failed to write idempotency anchor row");
        }
    }

    async fn classify(
        &self,
        message: &CanonicalMessage,
        tenant_id: &TenantId,
    ) -> Result<ClassifyOutcome, String> {
        let classification = self.llm.classify(message, tenant_id).await.map_err(|e| e.to_string())?;
        Ok(match classification.category {
            EmailCategory::SalesLead => ClassifyOutcome::SalesRelevant { classification },
            _ => ClassifyOutcome::NotRelevant { classification },
        })
    }

    async fn extract(
        &self,
        message: &CanonicalMessage,
        prefiltered_content: &str,
        fingerprint: &Fingerprint,
        tenant_id: &TenantId,
    ) -> ExtractionOutcome {
        let mut for_extraction = message.clone();
        for_extraction.text_body = prefiltered_content.to_string();

        let raw = match self.llm.extract(&for_extraction).await {
            Ok(result) => result,
            Err(e) => return ExtractionOutcome::Failed { reason: e.to_string() },
        };

        let now = Utc::now();
        let agent = self.llm.model_identifier().to_string();

        let mut tasks = Vec::new();
        for raw_value in raw.tasks {
            let raw_task = match normalize_task_candidate(&raw_value) {
                Parsed::Accepted(c) => c,
                Parsed::Rejected(reason) => {
                    tracing::debug!(reason, "dropped unparsable task candidate");
                    continue;
                }
            };
            match build_task(tenant_id.clone(), raw_task, *fingerprint, now, agent.clone()) {
                Ok(task) => tasks.push(task),
                Err(reason) => tracing::debug!(reason, "dropped malformed task candidate"),
            }
        }

        let mut deals = Vec::new();
        for raw_value in raw.deals {
            let raw_deal = match normalize_deal_candidate(&raw_value) {
                Parsed::Accepted(c) => c,
                Parsed::Rejected(reason) => {
                    tracing::debug!(reason, "dropped unparsable deal candidate");
                    continue;
                }
            };
            match build_deal(tenant_id.clone(), raw_deal, *fingerprint, now, agent.clone()) {
                Ok(deal) => deals.push(deal),
                Err(reason) => tracing::debug!(reason, "dropped malformed deal candidate"),
            }
        }

        let contacts = if tasks.is_empty() && deals.is_empty() {
            Vec::new()
        } else {
            vec![Contact::new(tenant_id.clone(), message.sender_address.clone(), message.sender_display_name.clone(), ContactSource::EmailExtraction, message.received_at, now)]
        };

        ExtractionOutcome::Extracted { tasks, deals, contacts, tokens_used: raw.tokens_used }
    }

    /// Partitions candidates by `confidence_threshold` (§4.D): every
    /// candidate is kept and persisted, only the status differs between
    /// `accepted` and `draft`. Nothing is ever dropped here.
    fn confidence_gate(
        &self,
        tasks: Vec<Task>,
        deals: Vec<Deal>,
        contacts: Vec<Contact>,
    ) -> GatedCandidates {
        let threshold = self.settings.confidence_threshold;
        let mut accepted_count = 0;
        let mut draft_count = 0;

        let tasks: Vec<Task> = tasks
            .into_iter()
            .map(|t| {
                if t.confidence >= threshold {
                    accepted_count += 1;
                    t.with_gated_status(TaskStatus::Accepted)
                } else {
                    draft_count += 1;
                    t.with_gated_status(TaskStatus::Draft)
                }
            })
            .collect();

        let deals: Vec<Deal> = deals
            .into_iter()
            .map(|d| {
                if d.confidence >= threshold {
                    accepted_count += 1;
                    d.with_gated_status(DealStatus::Accepted)
                } else {
                    draft_count += 1;
                    d.with_gated_status(DealStatus::Draft)
                }
            })
            .collect();

        GatedCandidates { tasks, deals, contacts, accepted_count, draft_count }
    }

    async fn persist(
        &self,
        tenant_id: &TenantId,
        gated: GatedCandidates,
        idempotency_row: IdempotencyRow,
    ) -> PersistOutcome {
        let candidates = ExtractedCandidates { tasks: gated.tasks, deals: gated.deals, contacts: gated.contacts };

        match self.persistence.save_extracted(tenant_id, candidates, idempotency_row).await {
            // Counts are derived from what actually landed, not from what
            // was asked for, so a partial write is never misreported as
            // complete (§4.F).
            Ok(saved) => PersistOutcome::Persisted { task_count: saved.task_ids.len(), deal_count: saved.deal_ids.len(), contact_count: saved.contact_ids.len() },
            Err(crate::persistence::PersistenceError::IdempotencyWriteError) => PersistOutcome::AlreadyProcessed,
            Err(e) => PersistOutcome::Rejected { reason: e.to_string() },
        }
    }
}

/// One `task.auto_accepted`/`deal.auto_accepted`/`requires_review` event per
/// gated candidate (§4.D Emit).
fn gated_events(
    tenant_id: &TenantId,
    gated: &GatedCandidates,
) -> Vec<PipelineEvent> {
    let mut events = Vec::with_capacity(gated.tasks.len() + gated.deals.len());

    for task in &gated.tasks {
        events.push(match task.status {
            TaskStatus::Accepted => PipelineEvent::TaskAutoAccepted { tenant_id: tenant_id.clone(), task_id: task.id, title: task.title.clone() },
            _ => PipelineEvent::RequiresReview { tenant_id: tenant_id.clone(), kind: "task", record_id: task.id, title: task.title.clone() },
        });
    }

    for deal in &gated.deals {
        events.push(match deal.status {
            DealStatus::Accepted => PipelineEvent::DealAutoAccepted { tenant_id: tenant_id.clone(), deal_id: deal.id, title: deal.title.clone() },
            _ => PipelineEvent::RequiresReview { tenant_id: tenant_id.clone(), kind: "deal", record_id: deal.id, title: deal.title.clone() },
        });
    }

    events
}

fn build_task(
    tenant_id: TenantId,
    raw: RawTaskCandidate,
    fingerprint: Fingerprint,
    now: DateTime<Utc>,
    agent: String,
) -> Result<Task, String> {
    let priority = match raw.priority.trim().to_lowercase().as_str() {
        "high" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    };
    let due_at = chrono::NaiveDate::parse_from_str(raw.due_date.trim(), "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)).and_then(|dt| dt.and_local_timezone(Utc).single());

    Task::new(tenant_id, raw.title, priority, raw.confidence.clamp(0.0, 1.0), agent, raw.snippet, fingerprint, due_at, now)
}

fn build_deal(
    tenant_id: TenantId,
    raw: RawDealCandidate,
    fingerprint: Fingerprint,
    now: DateTime<Utc>,
    agent: String,
) -> Result<Deal, String> {
    let currency: Currency = raw.currency.parse().unwrap_or_default();

    let value = normalize_indian_shorthand(&raw.value).or_else(|| raw.value.trim().replace(',', "").parse::<f64>().ok().map(|n| n.round() as i64)).unwrap_or(0).max(0);

    let stage = match raw.stage.trim().to_lowercase().as_str() {
        "contacted" => DealStage::Contacted,
        "demo" | "qualified" => DealStage::Demo,
        "proposal" => DealStage::Proposal,
        "negotiation" => DealStage::Negotiation,
        "closed_won" | "closed-won" | "won" => DealStage::ClosedWon,
        "closed_lost" | "closed-lost" | "lost" => DealStage::ClosedLost,
        _ => DealStage::Lead,
    };

    Deal::new(tenant_id, raw.title, value, currency, stage, raw.probability.min(100), raw.confidence.clamp(0.0, 1.0), agent, raw.snippet, fingerprint, now)
}
