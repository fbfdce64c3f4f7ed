use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alert_cell::{AlertSink, RedisAlertSink};
use health_cell::{HealthCheckSpec, HttpProbe, RedisProbe, ServiceType};
use monitoring_cell::{create_monitoring_router, MonitoringHandlers};
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting monitoring API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Alert persistence is optional; a missing or unreachable redis only
    // disables the sink, the in-memory alert store still works.
    let sink: Option<Arc<dyn AlertSink>> = match config.redis_url.as_deref() {
        Some(url) if config.is_redis_configured() => match RedisAlertSink::new(url).await {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!("alert persistence disabled: {}", e);
                None
            }
        },
        _ => None,
    };

    let handlers = Arc::new(MonitoringHandlers::with_alert_sink(&config, sink));
    register_default_checks(&handlers, &config).await?;

    let orchestrator = handlers.orchestrator();
    orchestrator.start().await;

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = create_monitoring_router(handlers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    orchestrator.stop().await;
    info!("Shutdown complete");
    Ok(())
}

async fn register_default_checks(
    handlers: &MonitoringHandlers,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let registry = handlers.registry();
    let timeout = Duration::from_millis(config.check_timeout_ms);
    let breaker = (
        config.failure_threshold,
        Duration::from_secs(config.recovery_timeout_seconds),
    );

    if let Some(url) = config.redis_url.as_deref().filter(|u| !u.is_empty()) {
        let probe = RedisProbe::new(url).context("failed to build redis probe")?;
        registry
            .register(
                HealthCheckSpec::new("redis", ServiceType::Cache, Arc::new(probe))
                    .with_timeout(timeout)
                    .with_breaker(breaker.0, breaker.1),
            )
            .await?;
        info!("registered redis health check");
    }

    for (name, url) in &config.health_http_targets {
        let probe = HttpProbe::new(url, timeout)
            .with_context(|| format!("failed to build http probe for {}", name))?;
        registry
            .register(
                HealthCheckSpec::new(name, ServiceType::ExternalApi, Arc::new(probe))
                    .with_timeout(timeout)
                    .with_breaker(breaker.0, breaker.1),
            )
            .await?;
        info!("registered http health check for {} -> {}", name, url);
    }

    let names = registry.service_names().await;
    if names.is_empty() {
        warn!("no health checks registered - set REDIS_URL or HEALTH_HTTP_TARGETS");
    } else {
        info!("monitoring {} services: {:?}", names.len(), names);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
