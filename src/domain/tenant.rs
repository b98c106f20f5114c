use std::fmt;

/// The mailbox account whose messages are being processed; also the
/// ownership scope for every persisted record. In practice the account's
/// email address, but kept as a distinct type so a raw `String` can never be
/// passed where a tenant scope is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> Self { Self(raw.into().to_lowercase()) }
}

impl fmt::Display for TenantId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self { Self::new(s) }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self { Self::new(s) }
}

#[cfg(test)]
mod tests {
    use super::TenantId;

    #[test]
    fn lowercases_on_construction() {
        assert_eq!(TenantId::new("Alice@Example.COM").as_ref(), "alice@example.com");
    }

    #[test]
    fn equal_regardless_of_source_case() {
        assert_eq!(TenantId::new("Bob@Foo.com"), TenantId::new("bob@foo.com"));
    }
}
