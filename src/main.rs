//! Registration billing server.
//!
//! Loads configuration from the environment, connects to PostgreSQL and
//! serves the billing API.

use std::sync::Arc;

use axum::http::HeaderValue;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use registration_billing::adapters::http::{billing_router, BillingAppState};
use registration_billing::adapters::postgres::PostgresBillingStore;
use registration_billing::adapters::stripe::{StripeConfig, StripePaymentGateway};
use registration_billing::application::NumberingPolicy;
use registration_billing::config::AppConfig;
use registration_billing::domain::gateway::WebhookVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(Some(config.database.idle_timeout()))
        .connect(&config.database.url)
        .await?;

    let store = PostgresBillingStore::new(pool, config.database.statement_timeout());
    if config.database.run_migrations {
        store.migrate().await?;
        tracing::info!("Database migrations applied");
    }

    if config.payment.is_live_mode() {
        tracing::info!("Payment gateway running in live mode");
    }

    let state = BillingAppState {
        store: Arc::new(store),
        gateway: Arc::new(StripePaymentGateway::new(StripeConfig::from(&config.payment))),
        verifier: Arc::new(WebhookVerifier::new(
            config.payment.stripe_webhook_secret.clone(),
            config.payment.webhook_tolerance_secs,
        )),
        numbering: NumberingPolicy::from(&config.billing),
    };

    let app = billing_router()
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors_layer(config.server.allowed_origins()?))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Billing server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cors_layer(origins: Vec<HeaderValue>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
