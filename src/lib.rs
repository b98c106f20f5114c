pub mod configuration;
pub mod domain;
pub mod expiry;
pub mod llm;
pub mod mailbox;
pub mod persistence;
pub mod pipeline;
pub mod routes;
pub mod scheduler;
pub mod startup;
pub mod telemetry;
pub mod tokens;
pub mod utils;
