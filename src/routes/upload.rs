use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use serde::Deserialize;

use super::AppState;
use crate::domain::CanonicalMessage;
use crate::domain::SenderAddress;
use crate::domain::TenantId;
use crate::mailbox::decode_mime;
use crate::pipeline::DemoOutcome;
use crate::pipeline::PipelineOutcome;
use crate::utils::error_400;

#[derive(Deserialize)]
pub struct TenantPath {
    tenant_id: String,
}

/// Ad-hoc processing of a single raw RFC 5322 message (§6), for a tenant
/// that doesn't have the message in its mailbox — e.g. a forwarded email
/// pasted in for testing. Runs the real pipeline, idempotency log and
/// persistence included; this is not the demo endpoint.
pub async fn upload_raw_message(
    path: web::Path<TenantPath>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let tenant_id = TenantId::new(path.into_inner().tenant_id);
    let message = decode_mime(&body).map_err(error_400)?;
    let outcome = state.pipeline.process_message(&tenant_id, &message).await;
    Ok(HttpResponse::Ok().json(outcome_json(&outcome)))
}

#[derive(Deserialize)]
pub struct DemoRequest {
    subject: String,
    sender_address: String,
    sender_display_name: Option<String>,
    text_body: String,
}

/// Runs Classify/Prefilter/Extract/ConfidenceGate against an ad-hoc
/// message with no idempotency check and no persistence (§6). Rate
/// limited per source IP so it can be exposed without a tenant token.
pub async fn demo(
    req: HttpRequest,
    body: web::Json<DemoRequest>,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let ip = req.peer_addr().map(|addr| addr.ip()).unwrap_or_else(|| std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    if !state.demo_rate_limiter.allow(ip) {
        return Ok(HttpResponse::TooManyRequests().json(serde_json::json!({"error": "rate limit exceeded, try again later"})));
    }

    let body = body.into_inner();
    let sender_address = SenderAddress::parse(body.sender_address).map_err(error_400)?;
    let message = CanonicalMessage { message_id: CanonicalMessage::synthesize_message_id(chrono::Utc::now()), subject: body.subject, sender_address, sender_display_name: body.sender_display_name, text_body: body.text_body, received_at: chrono::Utc::now() };

    let demo_tenant = TenantId::new("demo");
    let outcome = state.pipeline.run_demo(&demo_tenant, &message).await;
    Ok(HttpResponse::Ok().json(demo_outcome_json(&outcome)))
}

fn outcome_json(outcome: &PipelineOutcome) -> serde_json::Value {
    match outcome {
        PipelineOutcome::Skipped { stage, reason } => serde_json::json!({"outcome": "skipped", "stage": stage, "reason": reason}),
        PipelineOutcome::NotSalesRelevant { category } => serde_json::json!({"outcome": "not_sales_relevant", "category": category}),
        PipelineOutcome::Persisted { task_count, deal_count, contact_count } => {
            serde_json::json!({"outcome": "persisted", "task_count": task_count, "deal_count": deal_count, "contact_count": contact_count})
        }
        PipelineOutcome::AlreadyProcessed => serde_json::json!({"outcome": "already_processed"}),
        PipelineOutcome::Failed { stage, reason } => serde_json::json!({"outcome": "failed", "stage": stage, "reason": reason}),
    }
}

fn demo_outcome_json(outcome: &DemoOutcome) -> serde_json::Value {
    match outcome {
        DemoOutcome::NotSalesRelevant { category } => serde_json::json!({"outcome": "not_sales_relevant", "category": category}),
        DemoOutcome::Skipped { stage, reason } => serde_json::json!({"outcome": "skipped", "stage": stage, "reason": reason}),
        DemoOutcome::Failed { stage, reason } => serde_json::json!({"outcome": "failed", "stage": stage, "reason": reason}),
        DemoOutcome::Previewed { category, tasks, deals, contacts } => {
            serde_json::json!({"outcome": "previewed", "category": category, "tasks": tasks, "deals": deals, "contacts": contacts})
        }
    }
}
