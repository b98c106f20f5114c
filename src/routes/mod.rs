mod health_check;
mod mailbox;
mod rate_limit;
mod records;
mod scheduler;
mod upload;

pub use health_check::health_check;
pub use mailbox::disconnect;
pub use mailbox::list_labels;
pub use rate_limit::DemoRateLimiter;
pub use records::list_contacts;
pub use records::list_deals;
pub use records::list_tasks;
pub use records::update_deal;
pub use records::update_task;
pub use scheduler::poll_now;
pub use scheduler::scheduler_status;
pub use scheduler::start_polling;
pub use scheduler::stop_polling;
pub use upload::demo;
pub use upload::upload_raw_message;

use std::sync::Arc;

use crate::mailbox::MailboxClient;
use crate::persistence::PersistenceStore;
use crate::pipeline::PipelineEngine;
use crate::scheduler::PollScheduler;
use crate::tokens::TokenStore;

/// Everything a route handler needs, shared across workers via
/// `web::Data` (§9 Non-goals excludes the HTTP surface's own internals,
/// but the handlers still need somewhere to reach the pipeline from).
pub struct AppState {
    pub tokens: Arc<dyn TokenStore>,
    pub mailbox: Arc<dyn MailboxClient>,
    pub persistence: Arc<dyn PersistenceStore>,
    pub pipeline: Arc<PipelineEngine>,
    pub scheduler: Arc<PollScheduler>,
    pub demo_rate_limiter: Arc<DemoRateLimiter>,
}
