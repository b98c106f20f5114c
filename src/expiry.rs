use std::sync::Arc;
use std::time::Duration;

use crate::persistence::PersistenceStore;

/// Background sweep that drops idempotency rows past `idempotency_ttl_days`
/// (§6). The "wide-column store" TTL the original system relies on has no
/// equivalent in PostgreSQL, so it is realized as a polling loop, mirroring
/// how the teacher repo expires idempotency keys.
async fn expire_once(
    store: &dyn PersistenceStore,
    ttl_days: i64,
) -> Result<u64, anyhow::Error> { Ok(store.expire_idempotency_rows(ttl_days).await?) }

async fn expiry_loop(
    store: Arc<dyn PersistenceStore>,
    ttl_days: i64,
) -> Result<(), anyhow::Error> {
    loop {
        match expire_once(store.as_ref(), ttl_days).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, "expired stale idempotency rows");
                }
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, "idempotency expiry sweep failed");
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        }
    }
}

/// Run as a separate task alongside the API server and the poll scheduler.
pub async fn init_expiry_worker(
    store: Arc<dyn PersistenceStore>,
    ttl_days: i64,
) -> Result<(), anyhow::Error> {
    expiry_loop(store, ttl_days).await
}
