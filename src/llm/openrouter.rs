use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use secrecy::Secret;

use super::Classification;
use super::EmailCategory;
use super::ExtractionResult;
use super::LlmClient;
use super::LlmError;
use crate::domain::CanonicalMessage;
use crate::domain::TenantId;

const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(8);

const CLASSIFY_SYSTEM_PROMPT: &str = "You are an expert email classifier for a sales CRM system.\n\n\
Classify the email into exactly one of: sales_lead, internal_operations, spam_noise, customer_support.\n\n\
- sales_lead: external prospects/customers inquiring about products, services, pricing, partnerships, or proposals.\n\
- internal_operations: colleagues within the same organization, development tooling, internal processes. The \
sender and recipient addresses belong to the same domain for this category; when they do, prefer it over \
sales_lead regardless of wording.\n\
- spam_noise: marketing, newsletters, automated notifications, unrelated messages.\n\
- customer_support: existing customers with issues, complaints, or support requests, not new opportunities.\n\n\
Respond with a single JSON object: {\"category\": string, \"confidence\": number between 0 and 1, \"reasoning\": string}. \
No additional text.";

const CLASSIFY_BATCH_SYSTEM_PROMPT: &str = "You are an expert email classifier for a sales CRM system.\n\n\
You will receive a numbered list of emails. Classify each one independently into exactly one of: sales_lead, \
internal_operations, spam_noise, customer_support.\n\n\
- sales_lead: external prospects/customers inquiring about products, services, pricing, partnerships, or proposals.\n\
- internal_operations: colleagues within the same organization, development tooling, internal processes. The \
sender and recipient addresses belong to the same domain for this category; when they do, prefer it over \
sales_lead regardless of wording.\n\
- spam_noise: marketing, newsletters, automated notifications, unrelated messages.\n\
- customer_support: existing customers with issues, complaints, or support requests, not new opportunities.\n\n\
Respond with a single JSON object: {\"classifications\": [{\"index\": number, \"category\": string, \
\"confidence\": number between 0 and 1, \"reasoning\": string}]}, one entry per email, using the same index \
given in the prompt. No additional text.";

const EXTRACT_SYSTEM_PROMPT: &str = "You are a business email analyzer. Extract actionable tasks and potential deals from email content.\n\n\
Only extract clear, actionable tasks with specific action verbs. Only identify deals with genuine buying \
signals: a quoted value, contract potential, or stated purchase intent. Be conservative: prefer an empty \
array over a speculative extraction. Include the email snippet that justifies each item and a confidence \
score between 0 and 1.\n\n\
Respond with a single JSON object: {\"tasks\": [{\"title\", \"description\", \"priority\", \"due_date\", \
\"confidence\", \"snippet\"}], \"deals\": [{\"title\", \"description\", \"value\", \"currency\", \"stage\", \
\"probability\", \"confidence\", \"snippet\"}]}. No additional text.";

/// One completion call's content plus whatever token usage the provider
/// reported (§4.E: "token counts are recorded when present").
struct Completion {
    content: String,
    tokens_used: Option<i64>,
}

/// Talks to any OpenAI-compatible chat-completion endpoint (§4.E); the
/// default configuration points at OpenRouter. Both operations share one
/// hand-written retry loop, rather than a generic `backoff`-crate
/// decorator, so the rate-limit detection stays inline and auditable.
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Secret<String>,
}

impl OpenRouterClient {
    pub fn new(
        base_url: String,
        model: String,
        api_key: Secret<String>,
        request_timeout: Duration,
    ) -> Self {
        let http = Client::builder().timeout(request_timeout).build().expect("reqwest client configuration is valid");
        Self { http, base_url, model, api_key }
    }

    async fn chat_completion_json(
        &self,
        system_prompt: &str,
        user_prompt: String,
    ) -> Result<Completion, LlmError> {
        let mut delay = INITIAL_DELAY;

        for attempt in 0..=MAX_RETRIES {
            let result = self.chat_completion_once(system_prompt, &user_prompt).await;
            match result {
                Ok(completion) => return Ok(completion),
                Err(e) if is_rate_limit(&e) && attempt < MAX_RETRIES => {
                    tracing::warn!(attempt, delay_secs = delay.as_secs(), "rate limit hit, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("loop always returns on the final iteration")
    }

    async fn chat_completion_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Completion, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        let resp = self.http.post(format!("{}/chat/completions", self.base_url)).bearer_auth(self.api_key.expose_secret()).json(&body).send().await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::Throttled);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            if text.to_lowercase().contains("rate limit") || text.to_lowercase().contains("too many requests") {
                return Err(LlmError::Throttled);
            }
            return Err(LlmError::ExtractionParseError(format!("upstream returned {status}: {text}")));
        }

        #[derive(serde::Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Option<Usage>,
        }
        #[derive(serde::Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(serde::Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(serde::Deserialize)]
        struct Usage {
            total_tokens: i64,
        }

        let parsed: ChatResponse = resp.json().await?;
        let tokens_used = parsed.usage.map(|u| u.total_tokens);
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| Completion { content: c.message.content, tokens_used })
            .ok_or_else(|| LlmError::ExtractionParseError("empty choices array".to_string()))
    }
}

#[derive(serde::Deserialize)]
struct RawClassification {
    category: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn is_rate_limit(e: &LlmError) -> bool { matches!(e, LlmError::Throttled) }

fn truncate_preview(
    content: &str,
    max_chars: usize,
) -> String {
    if content.chars().count() <= max_chars { content.to_string() } else { content.chars().take(max_chars).collect() }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    #[tracing::instrument(skip(self, message), fields(message_id = %message.message_id, %tenant_id))]
    async fn classify(
        &self,
        message: &CanonicalMessage,
        tenant_id: &TenantId,
    ) -> Result<Classification, LlmError> {
        let preview = truncate_preview(&message.text_body, 1000);
        let user_prompt = format!(
            "**From:** {}\n**To:** {}\n**Subject:** {}\n**Content Preview:** {}\n",
            message.sender_address, tenant_id, message.subject, preview
        );

        let completion = self.chat_completion_json(CLASSIFY_SYSTEM_PROMPT, user_prompt).await?;

        let raw: RawClassification = serde_json::from_str(&completion.content).map_err(|e| LlmError::ExtractionParseError(e.to_string()))?;
        Ok(Classification { category: EmailCategory::from_label(&raw.category), confidence: raw.confidence.clamp(0.0, 1.0), reasoning: raw.reasoning, tokens_used: completion.tokens_used })
    }

    /// One completion call classifying every message in `messages` (§2
    /// component D, §4.D "Batched variant"). Splits the reported token usage
    /// evenly across the batch since the provider reports only a single
    /// total for the whole call. A message whose index is missing from the
    /// model's response fails open to [`EmailCategory::Unknown`], the same
    /// posture `classify` takes on a parse failure (§7).
    #[tracing::instrument(skip(self, messages), fields(%tenant_id, batch_size = messages.len()))]
    async fn classify_batch(
        &self,
        messages: &[CanonicalMessage],
        tenant_id: &TenantId,
    ) -> Result<Vec<Classification>, LlmError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut user_prompt = format!("**To:** {tenant_id}\n\n");
        for (i, message) in messages.iter().enumerate() {
            let preview = truncate_preview(&message.text_body, 1000);
            user_prompt.push_str(&format!("--- Email {i} ---\n**From:** {}\n**Subject:** {}\n**Content Preview:** {}\n\n", message.sender_address, message.subject, preview));
        }

        let completion = self.chat_completion_json(CLASSIFY_BATCH_SYSTEM_PROMPT, user_prompt).await?;

        #[derive(serde::Deserialize)]
        struct RawBatch {
            classifications: Vec<RawIndexedClassification>,
        }
        #[derive(serde::Deserialize)]
        struct RawIndexedClassification {
            index: usize,
            #[serde(flatten)]
            inner: RawClassification,
        }

        let raw: RawBatch = serde_json::from_str(&completion.content).map_err(|e| LlmError::ExtractionParseError(e.to_string()))?;
        let tokens_per_message = completion.tokens_used.map(|t| t / messages.len().max(1) as i64);

        let mut by_index: std::collections::HashMap<usize, RawClassification> = raw.classifications.into_iter().map(|c| (c.index, c.inner)).collect();

        Ok((0..messages.len())
            .map(|i| match by_index.remove(&i) {
                Some(raw) => Classification { category: EmailCategory::from_label(&raw.category), confidence: raw.confidence.clamp(0.0, 1.0), reasoning: raw.reasoning, tokens_used: tokens_per_message },
                None => {
                    tracing::warn!(index = i, "batched classify response omitted this message; failing open to unknown");
                    Classification { category: EmailCategory::Unknown, confidence: 0.0, reasoning: "missing from batched classifier response".to_string(), tokens_used: tokens_per_message }
                }
            })
            .collect())
    }

    /// Structured output with a forgiving JSON parser (§4.E): a response
    /// the parser cannot make sense of yields zero candidates rather than
    /// an error, since an empty extraction and a parse failure should both
    /// just mean "nothing to save" to the caller.
    #[tracing::instrument(skip(self, message), fields(message_id = %message.message_id))]
    async fn extract(
        &self,
        message: &CanonicalMessage,
    ) -> Result<ExtractionResult, LlmError> {
        let user_prompt = format!("Analyze this email:\n\nSUBJECT: {}\nFROM: {}\n\nCONTENT:\n{}", message.subject, message.sender_address, message.text_body);

        let completion = self.chat_completion_json(EXTRACT_SYSTEM_PROMPT, user_prompt).await?;
        let mut result: ExtractionResult = serde_json::from_str(&completion.content).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "extractor output did not parse as JSON; treating as empty");
            ExtractionResult::default()
        });
        result.tokens_used = completion.tokens_used;
        Ok(result)
    }

    /// The model identifier this client was configured with, recorded as
    /// the `agent` string on every task/deal this extraction produces
    /// (§4.E: "the recorded agent string ... equals the model identifier
    /// used for that extraction").
    fn model_identifier(&self) -> &str { &self.model }
}
