//! HTTP API server for the transaction pipeline.
//!
//! Exposes checkout, refunds, and webhook ingestion over REST, with
//! structured logging (tracing) and Prometheus metrics. The worker pool
//! runs in-process alongside the server.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::jobs::{
    KIND_CANCEL_INTENT, KIND_CAPTURE_INTENT, KIND_CREATE_INTENT, KIND_CREATE_REFUND, KIND_NOTIFY,
    KIND_PROCESS_WEBHOOK, KIND_SYNC_TARGET,
};
use domain::{
    CaptureMode, InMemoryTransactionStore, RecordingTargetSink, ServiceConfig, TargetBinding,
    TargetCatalog, TransactionService, TransactionStore,
};
use job_store::{InMemoryJobStore, JobStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use webhooks::{InMemoryWebhookStore, Ingestor, WebhookStore};
use worker::handlers::{
    CancelIntentHandler, CaptureIntentHandler, CreateIntentHandler, CreateRefundHandler,
    HandlerSet, NotifyHandler, ProcessWebhookHandler, SyncTargetHandler, settlement_registry,
};
use worker::{InMemoryNotificationChannel, InMemoryPaymentProvider, PoolConfig, WorkerPool};

use config::Config;
use routes::transactions::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, J, W>(state: Arc<AppState<S, J, W>>, metrics_handle: PrometheusHandle) -> Router
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/transactions", post(routes::transactions::create::<S, J, W>))
        .route("/transactions/{id}", get(routes::transactions::get::<S, J, W>))
        .route(
            "/transactions/{id}/refunds",
            post(routes::transactions::refund::<S, J, W>)
                .get(routes::transactions::list_refunds::<S, J, W>),
        )
        .route(
            "/transactions/{id}/capture",
            post(routes::transactions::capture::<S, J, W>),
        )
        .route(
            "/transactions/{id}/cancel",
            post(routes::transactions::cancel::<S, J, W>),
        )
        .route(
            "/transactions/{id}/retry",
            post(routes::transactions::retry::<S, J, W>),
        )
        .route("/webhooks/{provider}", post(routes::webhooks::receive::<S, J, W>))
        .route("/jobs/discarded", get(routes::jobs::discarded::<S, J, W>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Everything `create_default_state` wires up besides the router state.
pub struct DefaultRuntime {
    pub pool: WorkerPool<InMemoryJobStore>,
    pub provider: InMemoryPaymentProvider,
    pub channel: InMemoryNotificationChannel,
    pub sink: Arc<RecordingTargetSink>,
    pub webhook_store: InMemoryWebhookStore,
}

type DefaultState = AppState<InMemoryTransactionStore, InMemoryJobStore, InMemoryWebhookStore>;

/// Creates application state over the in-memory stores, with the default
/// target catalog ("invoice" immediate, "booking" deferred) and the fake
/// provider. Production deployments construct the Postgres stores and a
/// real provider instead.
pub fn create_default_state(config: &Config) -> (Arc<DefaultState>, DefaultRuntime) {
    let tx_store = InMemoryTransactionStore::new();
    let job_store = InMemoryJobStore::new();
    let webhook_store = InMemoryWebhookStore::new();
    let provider = InMemoryPaymentProvider::new(config.webhook_secret.clone());
    let channel = InMemoryNotificationChannel::new();
    let sink = Arc::new(RecordingTargetSink::new());

    let catalog = TargetCatalog::new()
        .register(
            "invoice",
            TargetBinding::new(CaptureMode::Immediate, sink.clone()),
        )
        .register(
            "booking",
            TargetBinding::new(CaptureMode::Deferred, sink.clone()),
        );
    let service = TransactionService::new(
        tx_store,
        job_store.clone(),
        catalog,
        ServiceConfig {
            currency: config.currency.clone(),
            ..ServiceConfig::default()
        },
    );

    let handlers = HandlerSet::new()
        .register(
            KIND_CREATE_INTENT,
            Arc::new(CreateIntentHandler::new(service.clone(), provider.clone())),
        )
        .register(
            KIND_CAPTURE_INTENT,
            Arc::new(CaptureIntentHandler::new(service.clone(), provider.clone())),
        )
        .register(
            KIND_CANCEL_INTENT,
            Arc::new(CancelIntentHandler::new(service.clone(), provider.clone())),
        )
        .register(
            KIND_CREATE_REFUND,
            Arc::new(CreateRefundHandler::new(service.clone(), provider.clone())),
        )
        .register(
            KIND_PROCESS_WEBHOOK,
            Arc::new(ProcessWebhookHandler::new(
                webhook_store.clone(),
                provider.clone(),
                settlement_registry(service.clone()),
            )),
        )
        .register(
            KIND_SYNC_TARGET,
            Arc::new(SyncTargetHandler::new(service.clone())),
        )
        .register(KIND_NOTIFY, Arc::new(NotifyHandler::new(channel.clone())));

    let pool = WorkerPool::new(
        job_store.clone(),
        handlers,
        PoolConfig {
            workers_per_queue: config.workers_per_queue,
            ..PoolConfig::default()
        },
    );

    let state = Arc::new(AppState {
        service,
        ingestor: Ingestor::new(webhook_store.clone(), job_store.clone()),
        job_store,
        operator_token: config.operator_token.clone(),
    });

    (
        state,
        DefaultRuntime {
            pool,
            provider,
            channel,
            sink,
            webhook_store,
        },
    )
}
