use chrono::DateTime;
use chrono::Utc;
use validator::ValidateEmail;

/// A mailbox address, lowercased and validated to look like `local@domain` at
/// construction time. Used for both `CanonicalMessage::sender_address` and
/// the `Contact::email` it seeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct SenderAddress(String);

impl SenderAddress {
    pub fn parse(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into().trim().to_lowercase();
        if ValidateEmail::validate_email(&raw) {
            Ok(Self(raw))
        } else {
            Err(format!("invalid sender address: {raw:?}"))
        }
    }

    /// The part after `@`, used for same-domain internal-mail detection.
    pub fn domain(&self) -> &str { self.0.split('@').nth(1).unwrap_or("") }
}

impl<'de> serde::Deserialize<'de> for SenderAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        SenderAddress::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for SenderAddress {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for SenderAddress {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message decoded from the mailbox provider's raw MIME, transient by
/// design (§3): it is never persisted in full, only its fingerprint and the
/// derivative records the pipeline produces.
#[derive(Debug, Clone)]
pub struct CanonicalMessage {
    pub message_id: String,
    pub subject: String,
    pub sender_address: SenderAddress,
    pub sender_display_name: Option<String>,
    pub text_body: String,
    pub received_at: DateTime<Utc>,
}

impl CanonicalMessage {
    /// `message_id` falls back to `unknown-<epoch seconds of received_at>`
    /// when the provider omits a `Message-Id` header (§4.B).
    pub fn synthesize_message_id(received_at: DateTime<Utc>) -> String {
        format!("unknown-{}", received_at.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::SenderAddress;

    #[test]
    fn lowercases_and_trims() {
        let a = SenderAddress::parse("  Buyer@External.EXAMPLE ").unwrap();
        assert_eq!(a.as_ref(), "buyer@external.example");
    }

    #[test]
    fn rejects_missing_at() {
        assert!(SenderAddress::parse("not-an-email").is_err());
    }

    #[test]
    fn domain_extraction() {
        let a = SenderAddress::parse("alice@shreemaruti.com").unwrap();
        assert_eq!(a.domain(), "shreemaruti.com");
    }
}
