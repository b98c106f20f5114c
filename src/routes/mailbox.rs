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

/// Proxies to the mailbox provider's label list, mostly useful for the
/// connection-status check after an OAuth round trip completes (§4.B;
/// OAuth itself is out of scope per §9 Non-goals).
pub async fn list_labels(
    path: web::Path<TenantPath>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let tenant_id = TenantId::new(path.into_inner().tenant_id);
    let labels = state.mailbox.list_labels(&tenant_id).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(labels))
}

/// Revokes a tenant's stored token and purges every record it owns
/// (§4.A). Idempotent: disconnecting a tenant with no token is a no-op,
/// not an error.
pub async fn disconnect(
    path: web::Path<TenantPath>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let tenant_id = TenantId::new(path.into_inner().tenant_id);
    state.tokens.delete(&tenant_id).await.map_err(error_500)?;
    let counts = state.persistence.purge_tenant(&tenant_id, true).await.map_err(error_500)?;
    state.scheduler.forget(&tenant_id);
    Ok(HttpResponse::Ok().json(counts))
}
