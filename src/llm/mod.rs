mod openrouter;
mod parsing;

pub use openrouter::OpenRouterClient;
pub use parsing::normalize_deal_candidate;
pub use parsing::normalize_indian_shorthand;
pub use parsing::normalize_task_candidate;
pub use parsing::Parsed;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::CanonicalMessage;
use crate::domain::TenantId;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limited by upstream LLM provider")]
    Throttled,
    #[error("could not parse LLM output as the expected schema: {0}")]
    ExtractionParseError(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// One of four coarse categories a message is sorted into before extraction
/// is ever attempted (§4.D, §4.E). Only `SalesLead` proceeds past the
/// classify stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailCategory {
    SalesLead,
    InternalOperations,
    SpamNoise,
    CustomerSupport,
    Unknown,
}

impl EmailCategory {
    fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "sales_lead" => EmailCategory::SalesLead,
            "internal_operations" => EmailCategory::InternalOperations,
            "spam_noise" => EmailCategory::SpamNoise,
            "customer_support" => EmailCategory::CustomerSupport,
            _ => EmailCategory::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub category: EmailCategory,
    pub confidence: f64,
    pub reasoning: String,
    pub tokens_used: Option<i64>,
}

/// Raw, unvalidated task/deal candidates straight off the wire, before
/// domain constructors reject anything out of range (§4.E). Built by
/// [`crate::llm::normalize_task_candidate`] /
/// [`crate::llm::normalize_deal_candidate`] from whatever shape the model
/// actually emitted, not by direct `serde::Deserialize` — an LLM cannot be
/// trusted to honor a schema's field names or numeric bounds.
#[derive(Debug, Clone)]
pub struct RawTaskCandidate {
    pub title: String,
    pub description: String,
    pub priority: String,
    pub due_date: String,
    pub confidence: f64,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct RawDealCandidate {
    pub title: String,
    pub description: String,
    /// Free-form as the model wrote it: a plain number, or an Indian
    /// numbering-system shorthand like `"5 lakh"` (§3, §4.E).
    pub value: String,
    pub currency: String,
    pub stage: String,
    pub probability: u8,
    pub confidence: f64,
    pub snippet: String,
}

/// Output of one extraction call before alias normalization: raw JSON
/// objects, since the model is free to use any of several field-name
/// aliases per candidate (§4.D, §9 Design Note on dynamic dict parsing).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub tasks: Vec<serde_json::Value>,
    #[serde(default)]
    pub deals: Vec<serde_json::Value>,
    #[serde(skip)]
    pub tokens_used: Option<i64>,
}

/// Abstracts over the OpenAI-compatible chat-completion collaborator
/// (§4.E). `classify`/`extract` issue one completion call per message,
/// wrapped in the provider's own retry loop; `classify_batch` issues a
/// single completion call covering every message in the batch (§2 component
/// D, §4.D "Batched variant").
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// `tenant_id` is the mailbox this message was polled from, passed
    /// alongside the message so the model can compare sender domain against
    /// recipient domain (§4.D same-domain rule, §8 boundary law) — the
    /// message body alone carries no record of who it was sent to.
    async fn classify(
        &self,
        message: &CanonicalMessage,
        tenant_id: &TenantId,
    ) -> Result<Classification, LlmError>;

    /// One completion call classifying every message in `messages`, in the
    /// same order. Must yield the same verdicts `classify` would produce one
    /// message at a time (§4.D).
    async fn classify_batch(
        &self,
        messages: &[CanonicalMessage],
        tenant_id: &TenantId,
    ) -> Result<Vec<Classification>, LlmError>;

    async fn extract(
        &self,
        message: &CanonicalMessage,
    ) -> Result<ExtractionResult, LlmError>;

    /// Model identifier recorded as `agent` on every `Task`/`Deal` this
    /// client's `extract` produces (§3, §4.E).
    fn model_identifier(&self) -> &str;
}
