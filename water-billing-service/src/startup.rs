//! Application startup and lifecycle management.

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::billing::{BillGenerationEngine, PaymentLedger};
use crate::config::BillingConfig;
use crate::handlers::{bills, health, payments, reports};
use crate::services::{
    BillingStore, Database, HttpNotificationGateway, MockNotificationGateway, NotificationGateway,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub bills: Arc<BillGenerationEngine>,
    pub ledger: Arc<PaymentLedger>,
}

impl AppState {
    pub fn new(store: Arc<dyn BillingStore>, notifier: Arc<dyn NotificationGateway>) -> Self {
        Self {
            bills: Arc::new(BillGenerationEngine::new(store.clone(), notifier)),
            ledger: Arc::new(PaymentLedger::new(store.clone())),
            store,
        }
    }
}

/// Build the HTTP router over `state`.
pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
                user_id = tracing::field::Empty,
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/bills/generate", post(bills::generate_bills))
        .route(
            "/bills/month/:month",
            get(bills::month_bills).delete(bills::delete_bills),
        )
        .route("/payments", post(payments::record_payment))
        .route("/payments/:payment_id", delete(payments::reverse_payment))
        .route("/system-loss/:month", get(reports::system_loss))
        .route("/reports/income/:month", get(reports::income))
        .route("/reports/disconnections", get(reports::disconnections))
        .layer(trace_layer)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: BillingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: BillingConfig, run_migrations: bool) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let notifier: Arc<dyn NotificationGateway> = if config.notification.enabled {
            tracing::info!(
                service_url = %config.notification.service_url,
                "Bill notices go to the notification service"
            );
            Arc::new(
                HttpNotificationGateway::new(&config.notification)
                    .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
            )
        } else {
            tracing::info!("Notifications disabled, bill notices are only logged");
            Arc::new(MockNotificationGateway::new())
        };

        let state = AppState::new(Arc::new(db), notifier);

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Water billing service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "water-billing-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
