//! # creditctl: Credit Metering for AI Video Generation
//!
//! `creditctl` is the billing gate of a video-generation SaaS: it decides, for
//! each generated video, whether the owning account may be charged for it, and
//! records the outcome in an append-only usage ledger. Accounts hold a two-tier
//! balance - a per-period allowance granted by their subscription tier, plus a
//! purchasable top-up credit pool drawn only once the allowance is spent.
//!
//! ## The gate
//!
//! The core of the service is the credit ledger gate
//! ([`db::repos::LedgerRepo::consume`]): one serializable check-and-deduct per
//! usage event, executed under an exclusive per-account lock. It deduplicates
//! resubmissions of the same unit of work (a client refreshing the page
//! mid-generation must not be charged twice), counts usage strictly within the
//! caller-supplied billing period, and consumes base allowance before top-up
//! credits. Policy denials are data, not errors: an exhausted or unknown
//! account gets a structured [`ledger::Decision`] back, while storage faults
//! abort the whole unit of work with no partial effect.
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum).
//! Persistence goes through repository traits with two sqlx backends:
//! PostgreSQL for production, where the gate holds a `SELECT ... FOR UPDATE`
//! row lock, and SQLite for development and tests, where `BEGIN IMMEDIATE`
//! provides the (coarser) writer lock. Because all coordination lives in the
//! database lock, any number of service replicas can share one PostgreSQL
//! instance.
//!
//! Callers are other backend services, authenticated by a shared service key.
//! Besides the gate, the API offers account provisioning, top-up grants, a
//! per-period usage summary, and a random showcase-sample endpoint.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use creditctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = creditctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     creditctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod ledger;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{db::DbPool, errors::Result, openapi::ApiDoc};

pub use types::{AccountId, SampleId, UsageRecordId};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Config,
}

/// Liveness endpoint: OK when the database answers a ping.
async fn healthz(State(state): State<AppState>) -> Result<&'static str> {
    state.db.health_check().await?;
    Ok("OK")
}

/// Build the application router: the authenticated `/api/v1` surface, the open
/// health endpoint, the OpenAPI UI, and request tracing.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/generations",
            post(api::handlers::generations::record_generation),
        )
        .route("/accounts", post(api::handlers::accounts::create_account))
        .route("/accounts/{id}", get(api::handlers::accounts::get_account))
        .route(
            "/accounts/{id}/topup",
            post(api::handlers::accounts::grant_topup),
        )
        .route("/accounts/{id}/usage", get(api::handlers::accounts::get_usage))
        .route("/showcase", post(api::handlers::samples::create_sample))
        .route("/showcase/random", get(api::handlers::samples::random_sample))
        .layer(from_fn_with_state(
            state.clone(),
            auth::service_key_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(healthz))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations and builds the router
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        tracing::debug!("Starting creditctl with configuration: {:#?}", config);

        let db = Arc::new(DbPool::from_config(&config.database).await?);
        db.run_migrations().await?;

        if config.service_api_key.is_none() {
            tracing::warn!("No service_api_key configured; API authentication is disabled");
        }

        let state = AppState::builder().db(db).config(config.clone()).build();
        let router = build_router(state);

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application, shutting down gracefully when the given
    /// future resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("creditctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
