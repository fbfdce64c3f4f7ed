// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    get_active_alerts, get_alert_summary, get_component_health, get_dashboard,
    get_health_status, get_metric_stats, get_sla_report, resolve_alert, MonitoringHandlers,
};

pub fn create_monitoring_router(handlers: Arc<MonitoringHandlers>) -> Router {
    Router::new()
        .route("/health", get(get_health_status))
        .route("/health/component", get(get_component_health))
        .route("/dashboard", get(get_dashboard))
        .route("/sla", get(get_sla_report))
        .route("/metrics", get(get_metric_stats))
        .route("/alerts", get(get_active_alerts))
        .route("/alerts/summary", get(get_alert_summary))
        .route("/alerts/resolve", post(resolve_alert))
        .layer(CorsLayer::permissive())
        .with_state(handlers)
}
