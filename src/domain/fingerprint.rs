use sha2::Digest;
use sha2::Sha256;
use std::fmt;

use super::CanonicalMessage;

/// 256-bit digest of `message_id || normalized_body` (§3, GLOSSARY). Stable
/// across retries and restarts; the identity used for idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(message: &CanonicalMessage) -> Self {
        let normalized = normalize_body(&message.text_body);
        let mut hasher = Sha256::new();
        hasher.update(message.message_id.as_bytes());
        hasher.update(normalized.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    /// Reconstructs a fingerprint from the hex form [`Fingerprint::Display`]
    /// produces, for reading it back out of storage.
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        if hex.len() != 64 {
            return Err(format!("fingerprint hex must be 64 chars, got {}", hex.len()));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in bytes.iter_mut().enumerate() {
            *chunk = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|e| e.to_string())?;
        }
        Ok(Self(bytes))
    }
}

/// Collapse whitespace runs and trim, so that retried fetches of the same
/// message (which may differ only in incidental whitespace introduced by
/// intermediate MIME re-encoding) hash identically.
fn normalize_body(body: &str) -> String { body.split_whitespace().collect::<Vec<_>>().join(" ") }

impl fmt::Display for Fingerprint {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = <String as serde::Deserialize>::deserialize(deserializer)?;
        Fingerprint::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::Fingerprint;
    use crate::domain::CanonicalMessage;
    use crate::domain::SenderAddress;

    fn msg(
        id: &str,
        body: &str,
    ) -> CanonicalMessage {
        CanonicalMessage {
            message_id: id.to_string(),
            subject: "s".to_string(),
            sender_address: SenderAddress::parse("a@b.com").unwrap(),
            sender_display_name: None,
            text_body: body.to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn stable_across_whitespace_noise() {
        let a = Fingerprint::of(&msg("m1", "hello   world"));
        let b = Fingerprint::of(&msg("m1", "hello world\n"));
        assert_eq!(a, b);
    }

    #[test]
    fn differs_on_body_change() {
        let a = Fingerprint::of(&msg("m1", "hello world"));
        let b = Fingerprint::of(&msg("m1", "hello there"));
        assert_ne!(a, b);
    }

    #[test]
    fn differs_on_message_id_change() {
        let a = Fingerprint::of(&msg("m1", "hello world"));
        let b = Fingerprint::of(&msg("m2", "hello world"));
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_hex() {
        let fp = Fingerprint::of(&msg("m1", "hi"));
        let s = fp.to_string();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
