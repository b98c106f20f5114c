use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use super::Currency;
use super::Extracted;
use super::Fingerprint;
use super::TenantId;

/// Pipeline stage of a prospective deal. Fixed to the set named in §3 —
/// deliberately not the finer-grained stage list the original extractor used
/// internally, since downstream consumers only need this coarse view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Lead,
    Contacted,
    Demo,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl Default for DealStage {
    fn default() -> Self { DealStage::Lead }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Draft,
    Accepted,
    Rejected,
    Won,
    Lost,
}

impl Default for DealStatus {
    fn default() -> Self { DealStatus::Draft }
}

/// A prospective sale pulled out of an email, expressed in whole base units
/// of its currency (§3: Indian lakh/crore shorthand is normalized to an
/// integer before a `Deal` is ever constructed, not at read time).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub title: String,
    pub value: i64,
    pub currency: Currency,
    pub stage: DealStage,
    pub probability: u8,
    pub status: DealStatus,
    pub confidence: f64,
    pub agent: String,
    pub audit_snippet: String,
    pub source_fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        title: impl Into<String>,
        value: i64,
        currency: Currency,
        stage: DealStage,
        probability: u8,
        confidence: f64,
        agent: impl Into<String>,
        audit_snippet: impl Into<String>,
        source_fingerprint: Fingerprint,
        created_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        let title = title.into();
        if title.trim().is_empty() || title.chars().count() > 200 {
            return Err(format!("deal title must be 1-200 chars, got {} chars", title.chars().count()));
        }
        if value < 0 {
            return Err(format!("deal value must be non-negative, got {value}"));
        }
        if probability > 100 {
            return Err(format!("deal probability must be 0-100, got {probability}"));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("deal confidence must be within [0, 1], got {confidence}"));
        }
        let agent = agent.into();
        if agent.trim().is_empty() {
            return Err("deal agent (model identifier) must not be empty".to_string());
        }
        let audit_snippet = audit_snippet.into();
        if audit_snippet.chars().count() > 500 {
            return Err(format!("audit snippet must be <= 500 chars, got {}", audit_snippet.chars().count()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            title,
            value,
            currency,
            stage,
            probability,
            status: DealStatus::Draft,
            confidence,
            agent,
            audit_snippet,
            source_fingerprint,
            created_at,
            updated_at: created_at,
        })
    }

    /// Sets this deal's persisted status straight from the confidence gate
    /// (§4.D): at-or-above threshold becomes `accepted`, below becomes
    /// `draft`.
    pub fn with_gated_status(
        mut self,
        status: DealStatus,
    ) -> Self {
        self.status = status;
        self
    }
}

impl Extracted for Deal {
    fn confidence(&self) -> f64 { self.confidence }

    fn audit_snippet(&self) -> &str { &self.audit_snippet }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::Deal;
    use super::DealStage;
    use crate::domain::CanonicalMessage;
    use crate::domain::Currency;
    use crate::domain::Fingerprint;
    use crate::domain::SenderAddress;
    use crate::domain::TenantId;

    fn fp() -> Fingerprint {
        Fingerprint::of(&CanonicalMessage {
            message_id: "m1".to_string(),
            subject: "s".to_string(),
            sender_address: SenderAddress::parse("a@b.com").unwrap(),
            sender_display_name: None,
            text_body: "body".to_string(),
            received_at: Utc::now(),
        })
    }

    #[test]
    fn rejects_negative_value() {
        let res = Deal::new(TenantId::new("t"), "Renewal", -1, Currency::Usd, DealStage::Lead, 50, 0.6, "mistralai/mistral-small", "snippet", fp(), Utc::now());
        assert!(res.is_err());
    }

    #[test]
    fn rejects_probability_over_100() {
        let res = Deal::new(TenantId::new("t"), "Renewal", 1000, Currency::Usd, DealStage::Lead, 150, 0.6, "mistralai/mistral-small", "snippet", fp(), Utc::now());
        assert!(res.is_err());
    }

    #[test]
    fn accepts_valid_fields() {
        let res = Deal::new(TenantId::new("t"), "Annual renewal", 500_000, Currency::Inr, DealStage::Negotiation, 70, 0.8, "mistralai/mistral-small", "quoted 5 lakh", fp(), Utc::now());
        assert!(res.is_ok());
    }
}
