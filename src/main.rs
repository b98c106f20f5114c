use std::fmt::Debug;
use std::fmt::Display;

use tokio::task::JoinError;
use sales_funnel_pipeline::configuration::get_configuration;
use sales_funnel_pipeline::expiry::init_expiry_worker;
use sales_funnel_pipeline::startup::Application;
use sales_funnel_pipeline::telemetry::get_subscriber;
use sales_funnel_pipeline::telemetry::init_subscriber;

fn report_exit(
    name: &str,
    outcome: Result<Result<(), impl Debug + Display>, JoinError>,
) {
    match outcome {
        Ok(Ok(())) => tracing::info!("{name} exited gracefully"),
        Ok(Err(e)) => tracing::error!(error.cause_chain = ?e, error.message = %e, "{name} failed (inner)"),
        Err(e) => tracing::error!(error.cause_chain = ?e, error.message = %e, "{name} failed (outer)"),
    }
}

/// Initialise telemetry, load config, and start the server, scheduler, and
/// expiry worker side by side. The first of the three to exit brings the
/// whole process down.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("sales-funnel-pipeline", "info", std::io::stdout);
    init_subscriber(subscriber);

    let cfg = get_configuration()?;
    let app = Application::build(cfg).await?;

    let scheduler = app.scheduler.clone();
    let persistence = app.persistence.clone();
    let idempotency_ttl_days = app.idempotency_ttl_days;

    let server = app.run_until_stopped();
    let scheduler_loop = scheduler.run();
    let expiry_worker = init_expiry_worker(persistence, idempotency_ttl_days);

    let server_thread = tokio::spawn(server);
    let scheduler_thread = tokio::spawn(scheduler_loop);
    let expiry_thread = tokio::spawn(expiry_worker);

    tokio::select! {
        o = server_thread => { report_exit("API", o) },
        o = scheduler_thread => { report_exit("Poll scheduler", o) },
        o = expiry_thread => { report_exit("Idempotency expiry worker", o) },
    }

    Ok(())
}
