use actix_web::web;
use actix_web::HttpResponse;
use serde::Deserialize;

use super::AppState;
use crate::domain::TenantId;
use crate::utils::error_500;

#[derive(Deserialize)]
pub struct TenantPath {
    tenant_id: String,
}

/// Triggers an out-of-cadence poll for one tenant, bypassing the
/// scheduler's own interval (§4.C). Returns the number of messages the
/// pipeline processed, regardless of how many were ultimately persisted.
pub async fn poll_now(
    path: web::Path<TenantPath>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let tenant_id = TenantId::new(path.into_inner().tenant_id);
    let processed = state.scheduler.poll_now(&tenant_id).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "messages_processed": processed })))
}

/// Snapshot of every tenant's poll cursor and last-run stats (§4.C).
pub async fn scheduler_status(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "running": state.scheduler.is_running(),
        "tenants": state.scheduler.status(),
    }))
}

/// Resumes the background poll loop's cadence (§6 `polling_enabled`
/// toggled at runtime). The loop itself never stops ticking; this only
/// flips whether a tick actually polls.
pub async fn start_polling(state: web::Data<AppState>) -> HttpResponse {
    state.scheduler.resume();
    HttpResponse::Ok().json(serde_json::json!({ "running": true }))
}

pub async fn stop_polling(state: web::Data<AppState>) -> HttpResponse {
    state.scheduler.pause();
    HttpResponse::Ok().json(serde_json::json!({ "running": false }))
}
