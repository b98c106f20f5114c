use crate::domain::Contact;
use crate::domain::Deal;
use crate::domain::Task;
use crate::llm::Classification;

pub use super::prefilter::PrefilterOutcome;

/// §4.D's classify stage output. A distinct type per stage (rather than a
/// single struct of optionals) means a later stage can only read the field
/// the type system says the earlier stage actually produced.
#[derive(Debug, Clone)]
pub enum ClassifyOutcome {
    SalesRelevant { classification: Classification },
    NotRelevant { classification: Classification },
}

#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Extracted { tasks: Vec<Task>, deals: Vec<Deal>, contacts: Vec<Contact>, tokens_used: Option<i64> },
    Failed { reason: String },
}

/// Output of the confidence gate (§4.D): every candidate is kept, but
/// partitioned by `confidence_threshold` into `accepted` (persisted with
/// status `accepted`) and `draft` (persisted with status `draft`) — the
/// gate is a relabeling, not a filter.
#[derive(Debug, Clone)]
pub struct GatedCandidates {
    pub tasks: Vec<Task>,
    pub deals: Vec<Deal>,
    pub contacts: Vec<Contact>,
    pub accepted_count: usize,
    pub draft_count: usize,
}

#[derive(Debug, Clone)]
pub enum PersistOutcome {
    Persisted { task_count: usize, deal_count: usize, contact_count: usize },
    AlreadyProcessed,
    Rejected { reason: String },
}

/// Terminal state of one message's trip through the pipeline, emitted as
/// the final stage (§4.D "Emit").
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Skipped { stage: &'static str, reason: String },
    NotSalesRelevant { category: String },
    Persisted { task_count: usize, deal_count: usize, contact_count: usize },
    AlreadyProcessed,
    Failed { stage: &'static str, reason: String },
}

/// Result of running a message through Classify/Prefilter/Extract/
/// ConfidenceGate without an idempotency check or a Persist step (§6's
/// demo endpoint and §9 Non-goals — this bypasses ownership entirely, it
/// is a preview, not a pipeline run).
#[derive(Debug, Clone)]
pub enum DemoOutcome {
    NotSalesRelevant { category: String },
    Skipped { stage: &'static str, reason: String },
    Failed { stage: &'static str, reason: String },
    Previewed { category: String, tasks: Vec<Task>, deals: Vec<Deal>, contacts: Vec<Contact> },
}
