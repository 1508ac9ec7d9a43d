//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adreel_api::{create_router, metrics, ApiConfig, AppState};
use adreel_api::auth::HsVerifier;
use adreel_engine::{
    render_queue, AdEngine, ContentGenerator, FakeGenerator, FakeRenderer, RateGate,
    RateLimitConfig, Renderer, RetryConfig, SlidingWindowLimiter,
};
use adreel_storage::{BlobClient, DeliveryConfig, DeliveryUrlGenerator};
use adreel_store::MemoryStore;
use adreel_worker::{RenderWorker, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("adreel=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting adreel-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let store = Arc::new(MemoryStore::new());
    let (queue, queue_consumer) = render_queue();

    // Stand-in collaborators; the real model and compositing services are
    // wired in their own deployments.
    let generator: Arc<dyn ContentGenerator> = Arc::new(FakeGenerator::new());
    let renderer: Arc<dyn Renderer> = Arc::new(FakeRenderer::completing_after(10));

    let gate: Arc<dyn RateGate> =
        Arc::new(SlidingWindowLimiter::new(RateLimitConfig::from_env()));
    let engine = Arc::new(AdEngine::new(
        Arc::clone(&store),
        generator,
        gate,
        queue,
        RetryConfig::from_env(),
    ));

    // Render worker shares the in-process store with the API.
    let worker = RenderWorker::new(Arc::clone(&store), renderer, WorkerConfig::from_env());
    tokio::spawn(async move {
        worker.run(queue_consumer).await;
    });

    let delivery = match BlobClient::from_env() {
        Ok(client) => Some(Arc::new(DeliveryUrlGenerator::new(
            client,
            DeliveryConfig::from_env(),
        ))),
        Err(e) => {
            warn!("Blob storage not configured, download URLs disabled: {}", e);
            None
        }
    };

    if config.jwt_secret == "dev-secret" && config.is_production() {
        warn!("AUTH_JWT_SECRET is not set in production");
    }

    let state = AppState {
        verifier: Arc::new(HsVerifier::new(&config.jwt_secret)),
        config: config.clone(),
        engine,
        store,
        delivery,
    };

    // Initialize metrics
    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics())
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
