use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use super::Extracted;
use super::Fingerprint;
use super::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self { Priority::Medium }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Draft,
    Accepted,
    Rejected,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self { TaskStatus::Draft }
}

/// An actionable follow-up the extractor pulled out of a sales-relevant
/// email. Constructed only through [`Task::new`], which enforces the field
/// invariants from §3 so no caller can build a `Task` that violates them.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub title: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub confidence: f64,
    pub agent: String,
    pub audit_snippet: String,
    pub source_fingerprint: Fingerprint,
    pub due_at: Option<DateTime<Utc>>,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        title: impl Into<String>,
        priority: Priority,
        confidence: f64,
        agent: impl Into<String>,
        audit_snippet: impl Into<String>,
        source_fingerprint: Fingerprint,
        due_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        let title = title.into();
        if title.trim().is_empty() || title.chars().count() > 200 {
            return Err(format!("task title must be 1-200 chars, got {} chars", title.chars().count()));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("task confidence must be within [0, 1], got {confidence}"));
        }
        let agent = agent.into();
        if agent.trim().is_empty() {
            return Err("task agent (model identifier) must not be empty".to_string());
        }
        let audit_snippet = audit_snippet.into();
        if audit_snippet.chars().count() > 500 {
            return Err(format!("audit snippet must be <= 500 chars, got {}", audit_snippet.chars().count()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            title,
            priority,
            status: TaskStatus::Draft,
            confidence,
            agent,
            audit_snippet,
            source_fingerprint,
            due_at,
            assignee_id: None,
            created_at,
            updated_at: created_at,
        })
    }

    /// Sets this task's persisted status straight from the confidence gate
    /// (§4.D): at-or-above threshold becomes `accepted`, below becomes
    /// `draft`. Both are written; only the status differs.
    pub fn with_gated_status(
        mut self,
        status: TaskStatus,
    ) -> Self {
        self.status = status;
        self
    }
}

impl Extracted for Task {
    fn confidence(&self) -> f64 { self.confidence }

    fn audit_snippet(&self) -> &str { &self.audit_snippet }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::Priority;
    use super::Task;
    use crate::domain::CanonicalMessage;
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
    fn rejects_empty_title() {
        let res = Task::new(TenantId::new("t"), "", Priority::Medium, 0.5, "mistralai/mistral-small", "snippet", fp(), None, Utc::now());
        assert!(res.is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let res = Task::new(TenantId::new("t"), "Follow up", Priority::Medium, 1.5, "mistralai/mistral-small", "snippet", fp(), None, Utc::now());
        assert!(res.is_err());
    }

    #[test]
    fn rejects_oversized_audit_snippet() {
        let snippet = "x".repeat(501);
        let res = Task::new(TenantId::new("t"), "Follow up", Priority::Medium, 0.5, "mistralai/mistral-small", snippet, fp(), None, Utc::now());
        assert!(res.is_err());
    }

    #[test]
    fn accepts_valid_fields() {
        let res = Task::new(TenantId::new("t"), "Follow up with buyer", Priority::High, 0.9, "mistralai/mistral-small", "per email", fp(), None, Utc::now());
        assert!(res.is_ok());
    }
}
