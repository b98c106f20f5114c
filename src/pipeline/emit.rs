use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::TenantId;

/// Events the Emit stage produces (§4.D). The core's only contract is that
/// emit runs exactly once per message; what a sink does with the events
/// (log them, queue them, post a webhook) is up to the implementation.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ProcessingCompleted { tenant_id: TenantId, message_id: String, task_count: usize, deal_count: usize, contact_count: usize },
    TaskAutoAccepted { tenant_id: TenantId, task_id: Uuid, title: String },
    DealAutoAccepted { tenant_id: TenantId, deal_id: Uuid, title: String },
    RequiresReview { tenant_id: TenantId, kind: &'static str, record_id: Uuid, title: String },
}

#[async_trait]
pub trait EmitSink: Send + Sync {
    async fn emit(
        &self,
        event: PipelineEvent,
    );
}

/// Default sink: writes each event as a structured log line. A webhook or
/// queue-backed sink can implement the same trait without touching the
/// engine.
pub struct TracingEmitSink;

#[async_trait]
impl EmitSink for TracingEmitSink {
    async fn emit(
        &self,
        event: PipelineEvent,
    ) {
        match event {
            PipelineEvent::ProcessingCompleted { tenant_id, message_id, task_count, deal_count, contact_count } => {
                tracing::info!(%tenant_id, %message_id, task_count, deal_count, contact_count, "processing_completed");
            }
            PipelineEvent::TaskAutoAccepted { tenant_id, task_id, title } => {
                tracing::info!(%tenant_id, %task_id, title, "task.auto_accepted");
            }
            PipelineEvent::DealAutoAccepted { tenant_id, deal_id, title } => {
                tracing::info!(%tenant_id, %deal_id, title, "deal.auto_accepted");
            }
            PipelineEvent::RequiresReview { tenant_id, kind, record_id, title } => {
                tracing::info!(%tenant_id, kind, %record_id, title, "requires_review");
            }
        }
    }
}
