use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use financehub_gateway::{config::GatewayConfig, metrics::register_metrics, routes, state::AppState};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = GatewayConfig::from_env().expect("Failed to load configuration");
    let port = config.port;

    tracing::info!("Starting financehub-gateway on port {}", port);
    tracing::info!("Origin: {}", config.origin_url);
    tracing::info!("Entitlement check: {}", config.entitlement_url);
    tracing::info!(
        "Protected patterns: {:?}, public exceptions: {:?}",
        config.protected_patterns,
        config.public_paths
    );

    // Register Prometheus metrics
    register_metrics();

    // Create shared state
    let state = AppState::new(config).expect("Failed to initialize gateway state");
    let state_data = web::Data::new(state);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(routes::configure(state_data.clone()))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
