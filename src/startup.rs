use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::llm::OpenRouterClient;
use crate::mailbox::GmailLikeClient;
use crate::persistence::PgPersistenceStore;
use crate::pipeline::PipelineEngine;
use crate::routes::demo;
use crate::routes::disconnect;
use crate::routes::health_check;
use crate::routes::list_contacts;
use crate::routes::list_deals;
use crate::routes::list_labels;
use crate::routes::list_tasks;
use crate::routes::poll_now;
use crate::routes::scheduler_status;
use crate::routes::start_polling;
use crate::routes::stop_polling;
use crate::routes::update_deal;
use crate::routes::update_task;
use crate::routes::upload_raw_message;
use crate::routes::AppState;
use crate::routes::DemoRateLimiter;
use crate::scheduler::PollScheduler;
use crate::tokens::PgTokenStore;

/// Wrapper for actix's `Server` with access to the bound port, plus the
/// background tasks the server needs to run alongside: the poll scheduler
/// and the idempotency expiry sweep (§4.C, §6).
pub struct Application {
    port: u16,
    server: Server,
    pub scheduler: Arc<PollScheduler>,
    pub persistence: Arc<dyn crate::persistence::PersistenceStore>,
    pub idempotency_ttl_days: i64,
}

impl Application {
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        let port = listener.local_addr()?.port();

        let pool = get_connection_pool(&cfg.database);

        let tokens = Arc::new(PgTokenStore::new(pool.clone()));
        let persistence = Arc::new(PgPersistenceStore::new(pool.clone()));
        let mailbox = Arc::new(GmailLikeClient::new(cfg.application.base_url.clone(), tokens.clone()));
        let llm = Arc::new(OpenRouterClient::new(cfg.llm.base_url.clone(), cfg.llm.model.clone(), cfg.llm.api_key.clone(), Duration::from_millis(cfg.llm.request_timeout_ms)));

        let pipeline = Arc::new(PipelineEngine::new(mailbox.clone(), llm.clone(), persistence.clone(), cfg.pipeline.clone()));
        let scheduler = Arc::new(PollScheduler::new(cfg.pipeline.clone(), tokens.clone(), pipeline.clone()));

        let demo_rate_limiter = Arc::new(DemoRateLimiter::new(10, Duration::from_secs(60)));
        let state = web::Data::new(AppState { tokens: tokens.clone(), mailbox, persistence: persistence.clone(), pipeline, scheduler: scheduler.clone(), demo_rate_limiter });

        let server = HttpServer::new(move || {
            App::new()
                .wrap(TracingLogger::default())
                .route("/health_check", web::get().to(health_check))
                .service(
                    web::scope("/tenants/{tenant_id}")
                        .route("/labels", web::get().to(list_labels))
                        .route("/disconnect", web::post().to(disconnect))
                        .route("/poll", web::post().to(poll_now))
                        .route("/tasks", web::get().to(list_tasks))
                        .route("/tasks/{record_id}", web::patch().to(update_task))
                        .route("/deals", web::get().to(list_deals))
                        .route("/deals/{record_id}", web::patch().to(update_deal))
                        .route("/contacts", web::get().to(list_contacts))
                        .route("/upload", web::post().to(upload_raw_message)),
                )
                .route("/scheduler/status", web::get().to(scheduler_status))
                .route("/scheduler/start", web::post().to(start_polling))
                .route("/scheduler/stop", web::post().to(stop_polling))
                .route("/demo", web::post().to(demo))
                .app_data(state.clone())
        })
        .listen(listener)?
        .run();

        Ok(Self { port, server, scheduler, persistence, idempotency_ttl_days: cfg.pipeline.idempotency_ttl_days })
    }

    pub fn get_port(&self) -> u16 { self.port }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

pub fn get_connection_pool(db_cfg: &crate::configuration::DatabaseSettings) -> PgPool { PgPoolOptions::new().connect_lazy_with(db_cfg.connect_options()) }
