use rust_sales_ops_api::{
    api,
    config::Config,
    db::Database,
    follow_ups::PgFollowUpStore,
    handlers::{self, AppState},
    ingestion::SaleOrderIngestion,
    odoo_client::OdooClient,
    payments::{DisabledPaymentLookup, PaymentStatusLookup, StripePaymentLookup},
};

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database and follow-up schema,
/// the ERP client and the payment processor lookup, then starts the Axum
/// server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_sales_ops_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    db.ensure_schema().await?;
    tracing::info!("Database connection pool established, follow-up schema ready");

    let odoo_client = Arc::new(OdooClient::from_config(&config)?);
    let ingestion = Arc::new(SaleOrderIngestion::new(
        odoo_client,
        config.memoize_partner_lookups,
    ));
    tracing::info!(
        "ERP ingestion ready (partner memoization: {})",
        config.memoize_partner_lookups
    );

    let payments: Arc<dyn PaymentStatusLookup> = match config.stripe_secret_key.clone() {
        Some(key) => match StripePaymentLookup::new(config.stripe_base_url.clone(), key) {
            Ok(lookup) => {
                tracing::info!("✓ Stripe payment lookup initialized");
                Arc::new(lookup)
            }
            Err(e) => {
                tracing::error!("Failed to initialize Stripe lookup: {}", e);
                Arc::new(DisabledPaymentLookup)
            }
        },
        None => Arc::new(DisabledPaymentLookup),
    };

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        ingestion,
        follow_ups: Arc::new(PgFollowUpStore::new(db.pool.clone())),
        payments,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = api::routes().layer(
        ServiceBuilder::new()
            // Request size limit: 5MB max payload
            .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
            // Rate limiting: 10 req/sec per IP, burst of 20
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
