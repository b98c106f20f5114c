use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use super::SenderAddress;
use super::TenantId;

/// How a [`Contact`] entered the store. Kept distinct from `Manual` (created
/// or edited directly through the HTTP surface) so the pipeline never
/// overwrites a human-entered contact with an extraction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    Manual,
    EmailExtraction,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub email: SenderAddress,
    pub display_name: Option<String>,
    pub source: ContactSource,
    pub last_contact_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(
        tenant_id: TenantId,
        email: SenderAddress,
        display_name: Option<String>,
        source: ContactSource,
        last_contact_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { id: Uuid::new_v4(), tenant_id, email, display_name, source, last_contact_at, created_at }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::Contact;
    use super::ContactSource;
    use crate::domain::SenderAddress;
    use crate::domain::TenantId;

    #[test]
    fn email_stays_lowercased_through_construction() {
        let email = SenderAddress::parse("Buyer@External.Example").unwrap();
        let contact = Contact::new(TenantId::new("t"), email, None, ContactSource::EmailExtraction, Utc::now(), Utc::now());
        assert_eq!(contact.email.as_ref(), "buyer@external.example");
    }
}
