//! Durable webhook ingestion.
//!
//! Inbound provider callbacks are persisted before anything else happens.
//! The unique `(provider, provider_event_id)` key is the deduplication
//! boundary; new events fan out as background jobs and processing runs
//! under a per-event exclusive claim. Signature verification happens at
//! processing time against the stored raw bytes, never at ingest.

pub mod error;
pub mod event;
pub mod ingest;
pub mod memory;
pub mod postgres;
pub mod registry;
pub mod store;
pub mod sweeper;

pub use error::{Result, WebhookError};
pub use event::{Envelope, WebhookEvent};
pub use ingest::{IngestOutcome, Ingestor};
pub use memory::InMemoryWebhookStore;
pub use postgres::PostgresWebhookStore;
pub use registry::{HandlerRegistry, HandlerResult, WebhookHandler};
pub use store::{InsertOutcome, WebhookStore};
pub use sweeper::spawn_claim_sweeper;
