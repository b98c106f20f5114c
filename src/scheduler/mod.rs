use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::configuration::PipelineSettings;
use crate::domain::TenantId;
use crate::pipeline::PipelineEngine;
use crate::tokens::TokenStore;

/// Runtime status of one tenant's poll cursor, surfaced through the HTTP
/// surface's status endpoint (§4.C).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TenantPollStatus {
    pub tenant_id: TenantId,
    pub cursor: DateTime<Utc>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_poll_message_count: Option<usize>,
}

/// Drives per-tenant polling on a fixed cadence (§4.C). Holds no message
/// state itself; every poll hands fetched messages straight to the
/// [`PipelineEngine`]. Cursors live in a `DashMap` so manual polls (from the
/// HTTP surface) and the background loop can touch the same tenant without
/// a global lock.
pub struct PollScheduler {
    settings: PipelineSettings,
    cursors: DashMap<TenantId, TenantPollStatus>,
    tokens: Arc<dyn TokenStore>,
    pipeline: Arc<PipelineEngine>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl PollScheduler {
    pub fn new(
        settings: PipelineSettings,
        tokens: Arc<dyn TokenStore>,
        pipeline: Arc<PipelineEngine>,
    ) -> Self {
        let running = AtomicBool::new(settings.polling_enabled);
        Self { settings, cursors: DashMap::new(), tokens, pipeline, shutdown: CancellationToken::new(), running }
    }

    pub fn shutdown_handle(&self) -> CancellationToken { self.shutdown.clone() }

    /// Whether the background loop currently fires on its cadence (§6
    /// `polling_enabled`, toggled at runtime by the start/stop surface).
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    pub fn pause(&self) { self.running.store(false, Ordering::SeqCst); }

    pub fn resume(&self) { self.running.store(true, Ordering::SeqCst); }

    pub fn status(&self) -> Vec<TenantPollStatus> { self.cursors.iter().map(|entry| entry.value().clone()).collect() }

    /// Drops a tenant's cursor entry so a future reconnect cold-starts
    /// rather than resuming from a stale position (§4.A disconnect flow).
    pub fn forget(
        &self,
        tenant_id: &TenantId,
    ) {
        self.cursors.remove(tenant_id);
    }

    /// Cold-start cursor: start of the current day in `first_sync_timezone`,
    /// converted to UTC, so a newly connected tenant's first poll only
    /// pulls messages received today (§4.C, §6).
    fn cold_start_cursor(&self) -> DateTime<Utc> {
        let tz = self.settings.first_sync_tz().unwrap_or(chrono_tz::UTC);
        let now_local = Utc::now().with_timezone(&tz);
        let start_of_day = now_local.date_naive().and_hms_opt(0, 0, 0).expect("midnight is always valid");
        tz.from_local_datetime(&start_of_day).single().map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(Utc::now)
    }

    fn cursor_for(
        &self,
        tenant_id: &TenantId,
    ) -> DateTime<Utc> {
        self.cursors.get(tenant_id).map(|s| s.cursor).unwrap_or_else(|| self.cold_start_cursor())
    }

    /// Runs one poll for a single tenant outside the scheduled cadence
    /// (manual trigger from the HTTP surface). Advances the cursor exactly
    /// as the background loop would.
    #[tracing::instrument(skip(self), fields(%tenant_id))]
    pub async fn poll_now(
        &self,
        tenant_id: &TenantId,
    ) -> Result<usize, anyhow::Error> {
        let since = self.cursor_for(tenant_id);
        let fetch_started_at = Utc::now();
        let processed = self.pipeline.run_poll(tenant_id, since, self.settings.max_messages_per_poll).await?;

        // Advance to the wall-clock time this fetch started, not the
        // timestamp of the last message seen: a message arriving between
        // the fetch and the next tick must not be skipped (§4.C).
        let new_cursor = fetch_started_at;
        self.cursors.insert(
            tenant_id.clone(),
            TenantPollStatus { tenant_id: tenant_id.clone(), cursor: new_cursor, last_poll_at: Some(Utc::now()), last_poll_message_count: Some(processed.message_count) },
        );
        Ok(processed.message_count)
    }

    /// Spawns the background loop as its own task. The returned
    /// `JoinHandle`-shaped future resolves once `shutdown_handle` is
    /// cancelled, mirroring the teacher's `init_expiry_worker` convention
    /// of returning a future the composition root can `tokio::spawn` and
    /// `tokio::select!` over.
    pub async fn run(self: Arc<Self>) -> Result<(), anyhow::Error> {
        let period = StdDuration::from_secs(self.settings.poll_period_minutes * 60);
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("scheduler received shutdown signal");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if self.is_running() {
                        self.poll_all_tenants().await;
                    } else {
                        tracing::debug!("polling paused; skipping tick");
                    }
                }
            }
        }
    }

    async fn poll_all_tenants(&self) {
        let tenants = match self.tokens.list_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, "failed to list tenants for scheduled poll");
                return;
            }
        };

        for tenant_id in tenants {
            let span = tracing::info_span!("scheduled_poll", %tenant_id);
            async {
                if let Err(e) = self.poll_now(&tenant_id).await {
                    tracing::warn!(error.cause_chain = ?e, "scheduled poll failed for tenant");
                }
            }
            .instrument(span)
            .await;
        }
    }
}
