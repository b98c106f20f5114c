use actix_web::web;
use actix_web::HttpResponse;
use serde::Deserialize;
use serde::Deserializer;
use uuid::Uuid;

use super::AppState;
use crate::domain::DealStage;
use crate::domain::DealStatus;
use crate::domain::TaskStatus;
use crate::domain::TenantId;
use crate::persistence::DealPatch;
use crate::persistence::PageCursor;
use crate::persistence::TaskPatch;
use crate::utils::error_400;
use crate::utils::error_500;

#[derive(Deserialize)]
pub struct TenantPath {
    tenant_id: String,
}

#[derive(Deserialize)]
pub struct RecordPath {
    tenant_id: String,
    record_id: Uuid,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    cursor_created_before: Option<chrono::DateTime<chrono::Utc>>,
    cursor_id: Option<Uuid>,
    status: Option<String>,
}

fn default_limit() -> u32 { 50 }

impl ListQuery {
    fn cursor(&self) -> Option<PageCursor> {
        match (self.cursor_created_before, self.cursor_id) {
            (Some(created_before), Some(id)) => Some(PageCursor { created_before, id }),
            _ => None,
        }
    }
}

fn parse_task_status(s: &str) -> Result<TaskStatus, String> {
    match s {
        "draft" => Ok(TaskStatus::Draft),
        "accepted" => Ok(TaskStatus::Accepted),
        "rejected" => Ok(TaskStatus::Rejected),
        "completed" => Ok(TaskStatus::Completed),
        other => Err(format!("unrecognized task status: {other}")),
    }
}

fn parse_deal_status(s: &str) -> Result<DealStatus, String> {
    match s {
        "draft" => Ok(DealStatus::Draft),
        "accepted" => Ok(DealStatus::Accepted),
        "rejected" => Ok(DealStatus::Rejected),
        "won" => Ok(DealStatus::Won),
        "lost" => Ok(DealStatus::Lost),
        other => Err(format!("unrecognized deal status: {other}")),
    }
}

fn parse_deal_stage(s: &str) -> Result<DealStage, String> {
    match s {
        "lead" => Ok(DealStage::Lead),
        "contacted" => Ok(DealStage::Contacted),
        "demo" => Ok(DealStage::Demo),
        "proposal" => Ok(DealStage::Proposal),
        "negotiation" => Ok(DealStage::Negotiation),
        "closed_won" => Ok(DealStage::ClosedWon),
        "closed_lost" => Ok(DealStage::ClosedLost),
        other => Err(format!("unrecognized deal stage: {other}")),
    }
}

/// Deserializes a field present in the JSON body, wrapping it in `Some` so
/// callers can tell "absent" (outer `None`, field left untouched) apart
/// from "present and explicitly null" (outer `Some(None)`, field cleared).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Default)]
pub struct TaskPatchRequest {
    status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    due_at: Option<Option<chrono::DateTime<chrono::Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    assignee_id: Option<Option<Uuid>>,
}

#[derive(Deserialize, Default)]
pub struct DealPatchRequest {
    status: Option<String>,
    stage: Option<String>,
    value: Option<i64>,
    probability: Option<u8>,
}

pub async fn list_tasks(
    path: web::Path<TenantPath>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let tenant_id = TenantId::new(path.into_inner().tenant_id);
    let status = query.status.as_deref().map(parse_task_status).transpose().map_err(error_400)?;
    let page = state.persistence.list_tasks(&tenant_id, status, query.cursor(), query.limit).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "items": page.items,
        "next_cursor": page.next_cursor.map(|c| serde_json::json!({"created_before": c.created_before, "id": c.id})),
    })))
}

pub async fn list_deals(
    path: web::Path<TenantPath>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let tenant_id = TenantId::new(path.into_inner().tenant_id);
    let status = query.status.as_deref().map(parse_deal_status).transpose().map_err(error_400)?;
    let page = state.persistence.list_deals(&tenant_id, status, query.cursor(), query.limit).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "items": page.items,
        "next_cursor": page.next_cursor.map(|c| serde_json::json!({"created_before": c.created_before, "id": c.id})),
    })))
}

pub async fn list_contacts(
    path: web::Path<TenantPath>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let tenant_id = TenantId::new(path.into_inner().tenant_id);
    let page = state.persistence.list_contacts(&tenant_id, query.cursor(), query.limit).await.map_err(error_500)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "items": page.items,
        "next_cursor": page.next_cursor.map(|c| serde_json::json!({"created_before": c.created_before, "id": c.id})),
    })))
}

/// Mutates the small fixed set of fields a human reviewer is allowed to
/// touch on a task (§4.F); anything else about a task is extractor-owned.
pub async fn update_task(
    path: web::Path<RecordPath>,
    body: web::Json<TaskPatchRequest>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let RecordPath { tenant_id, record_id } = path.into_inner();
    let tenant_id = TenantId::new(tenant_id);
    let body = body.into_inner();
    let status = body.status.as_deref().map(parse_task_status).transpose().map_err(error_400)?;
    let patch = TaskPatch { status, due_at: body.due_at, assignee_id: body.assignee_id };
    state.persistence.update_task(&tenant_id, record_id, patch).await.map_err(error_500)?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn update_deal(
    path: web::Path<RecordPath>,
    body: web::Json<DealPatchRequest>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let RecordPath { tenant_id, record_id } = path.into_inner();
    let tenant_id = TenantId::new(tenant_id);
    let body = body.into_inner();
    let status = body.status.as_deref().map(parse_deal_status).transpose().map_err(error_400)?;
    let stage = body.stage.as_deref().map(parse_deal_stage).transpose().map_err(error_400)?;
    let patch = DealPatch { status, stage, value: body.value, probability: body.probability };
    state.persistence.update_deal(&tenant_id, record_id, patch).await.map_err(error_500)?;
    Ok(HttpResponse::NoContent().finish())
}
