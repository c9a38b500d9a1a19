pub mod config;
pub mod controllers;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use services::{lifecycle::PaymentEventProcessor, verifier::WebhookVerifier};
use store::BookingStore;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub verifier: WebhookVerifier,
    pub processor: PaymentEventProcessor,
}

impl AppState {
    pub fn new(store: Arc<dyn BookingStore>, verifier: WebhookVerifier) -> Arc<Self> {
        let processor = PaymentEventProcessor::new(store.clone());
        Arc::new(Self {
            store,
            verifier,
            processor,
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Marina Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
