use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use super::Fingerprint;
use super::SenderAddress;
use super::TenantId;

/// Outcome recorded against a processed fingerprint (§3). `Skipped` covers
/// every message the pipeline deliberately declined to extract from
/// (non-sales classification, prefilter rejection, classifier failure);
/// `Failed` is reserved for the persistence-layer failures named in §7
/// that must not be retried silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processed,
    Failed,
    Skipped,
}

/// The durable anchor row for one message fingerprint (§3, §4.F). Its
/// presence, once written with `status = Processed`, attests the pipeline
/// ran for this message; its absence is permission to run again.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdempotencyRow {
    pub fingerprint: Fingerprint,
    pub tenant_id: TenantId,
    pub original_message_id: String,
    pub subject: String,
    pub sender_address: SenderAddress,
    pub processed_at: DateTime<Utc>,
    pub status: IdempotencyStatus,
    pub classifier_verdict: Option<String>,
    pub tokens_used: Option<i64>,
    pub processing_ms: Option<i64>,
    pub task_ids: Vec<Uuid>,
    pub deal_ids: Vec<Uuid>,
    pub ttl_unix: i64,
}

impl IdempotencyRow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fingerprint: Fingerprint,
        tenant_id: TenantId,
        original_message_id: impl Into<String>,
        subject: impl Into<String>,
        sender_address: SenderAddress,
        processed_at: DateTime<Utc>,
        status: IdempotencyStatus,
        classifier_verdict: Option<String>,
        tokens_used: Option<i64>,
        processing_ms: Option<i64>,
        task_ids: Vec<Uuid>,
        deal_ids: Vec<Uuid>,
        ttl_days: i64,
    ) -> Self {
        let subject = subject.into();
        let subject = if subject.chars().count() > 500 { subject.chars().take(500).collect() } else { subject };
        let ttl_unix = (processed_at + chrono::Duration::days(ttl_days)).timestamp();
        Self {
            fingerprint,
            tenant_id,
            original_message_id: original_message_id.into(),
            subject,
            sender_address,
            processed_at,
            status,
            classifier_verdict,
            tokens_used,
            processing_ms,
            task_ids,
            deal_ids,
            ttl_unix,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::IdempotencyRow;
    use super::IdempotencyStatus;
    use crate::domain::CanonicalMessage;
    use crate::domain::Fingerprint;
    use crate::domain::SenderAddress;
    use crate::domain::TenantId;

    #[test]
    fn truncates_subject_to_500_chars() {
        let msg = CanonicalMessage {
            message_id: "m1".to_string(),
            subject: "s".repeat(600),
            sender_address: SenderAddress::parse("a@b.com").unwrap(),
            sender_display_name: None,
            text_body: "body".to_string(),
            received_at: Utc::now(),
        };
        let fp = Fingerprint::of(&msg);
        let row = IdempotencyRow::new(
            fp,
            TenantId::new("t"),
            "m1",
            "s".repeat(600),
            msg.sender_address.clone(),
            Utc::now(),
            IdempotencyStatus::Skipped,
            None,
            None,
            None,
            vec![],
            vec![],
            90,
        );
        assert_eq!(row.subject.chars().count(), 500);
    }
}
