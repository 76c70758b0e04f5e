pub mod health;
pub mod jobs;
pub mod metrics;
pub mod transactions;
pub mod webhooks;
