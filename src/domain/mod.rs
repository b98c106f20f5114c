mod contact;
mod currency;
mod deal;
mod fingerprint;
mod idempotency;
mod message;
mod task;
mod tenant;

pub use contact::Contact;
pub use contact::ContactSource;
pub use currency::Currency;
pub use deal::Deal;
pub use deal::DealStage;
pub use deal::DealStatus;
pub use fingerprint::Fingerprint;
pub use idempotency::IdempotencyRow;
pub use idempotency::IdempotencyStatus;
pub use message::CanonicalMessage;
pub use message::SenderAddress;
pub use task::Priority;
pub use task::Task;
pub use task::TaskStatus;
pub use tenant::TenantId;

/// Shared across [`Task`] and [`Deal`]: both are extracted candidates that
/// land in the store with a confidence score and a pointer back to the email
/// that produced them.
pub trait Extracted {
    fn confidence(&self) -> f64;
    fn audit_snippet(&self) -> &str;
}
