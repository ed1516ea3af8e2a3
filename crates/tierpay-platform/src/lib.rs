pub mod config;
pub mod contracts;
pub mod db;
pub mod pg_store;
pub mod redis_bus;

pub use config::{GatewaySettings, OutboxSettings, ServiceConfig};
pub use contracts::{HealthResponse, OutboxEnvelope, WebhookAck};
pub use db::{connect_database, run_migrations};
pub use pg_store::PgStore;
pub use redis_bus::RedisBus;
