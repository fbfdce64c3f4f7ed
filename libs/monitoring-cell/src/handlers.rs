// =====================================================================================
// MONITORING CELL HANDLERS
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{info, instrument};

use alert_cell::{Alert, AlertManager, AlertSink};
use health_cell::{HealthCheckRegistry, HealthStatus, LatencyThresholds};
use performance_cell::{MetricStats, PerformanceTracker};
use shared_config::AppConfig;
use sla_cell::{SlaEvaluator, SlaReport, SlaTargets};

use crate::models::{
    ComponentQuery, HealthQuery, HealthSummary, MetricQuery, MonitoringError, ResolveQuery,
};
use crate::orchestrator::MonitoringOrchestrator;

const DEFAULT_STATS_WINDOW_SECONDS: u64 = 60 * 60;

/// Wires the whole monitoring stack together and serves as the axum state.
pub struct MonitoringHandlers {
    orchestrator: Arc<MonitoringOrchestrator>,
    registry: Arc<HealthCheckRegistry>,
    tracker: Arc<PerformanceTracker>,
    alerts: Arc<AlertManager>,
}

impl MonitoringHandlers {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_alert_sink(config, None)
    }

    pub fn with_alert_sink(config: &AppConfig, sink: Option<Arc<dyn AlertSink>>) -> Self {
        let tracker = Arc::new(PerformanceTracker::new());

        let mut manager = AlertManager::new();
        if let Some(sink) = sink {
            manager = manager.with_sink(sink);
        }
        let alerts = Arc::new(manager);

        let registry = Arc::new(HealthCheckRegistry::new(
            LatencyThresholds {
                degraded_ms: config.degraded_latency_ms,
                unhealthy_ms: config.unhealthy_latency_ms,
            },
            tracker.clone(),
            alerts.clone(),
        ));

        let sla = Arc::new(SlaEvaluator::new(
            SlaTargets {
                p95_response_time_ms: config.sla_p95_target_ms,
                uptime_percent: config.sla_uptime_target_percent,
                error_rate_percent: config.sla_error_rate_target_percent,
                evaluation_window: Duration::from_secs(
                    config.sla_latency_window_minutes as u64 * 60,
                ),
                ..SlaTargets::default()
            },
            tracker.clone(),
            registry.clone(),
        ));

        let orchestrator = Arc::new(MonitoringOrchestrator::new(
            config,
            registry.clone(),
            tracker.clone(),
            alerts.clone(),
            sla,
        ));

        Self {
            orchestrator,
            registry,
            tracker,
            alerts,
        }
    }

    pub fn orchestrator(&self) -> Arc<MonitoringOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn registry(&self) -> Arc<HealthCheckRegistry> {
        self.registry.clone()
    }

    pub fn tracker(&self) -> Arc<PerformanceTracker> {
        self.tracker.clone()
    }

    pub fn alerts(&self) -> Arc<AlertManager> {
        self.alerts.clone()
    }
}

// =====================================================================================
// HEALTH ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_health_status(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(request): Query<HealthQuery>,
) -> Result<Json<HealthSummary>, MonitoringError> {
    let health = handlers.registry.run_all().await;

    let count = |status: fn(HealthStatus) -> bool| {
        health.services.values().filter(|r| status(r.status)).count() as u32
    };

    let response = HealthSummary {
        status: health.overall_status,
        healthy_services: count(|s| matches!(s, HealthStatus::Healthy)),
        degraded_services: count(|s| matches!(s, HealthStatus::Degraded)),
        unhealthy_services: count(|s| {
            matches!(s, HealthStatus::Unhealthy | HealthStatus::Critical)
        }),
        checked_at: health.checked_at,
        details: if request.include_details.unwrap_or(false) {
            Some(health)
        } else {
            None
        },
    };

    Ok(Json(response))
}

#[instrument(skip(handlers))]
pub async fn get_component_health(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<ComponentQuery>,
) -> Result<Json<health_cell::CheckResult>, MonitoringError> {
    let result = handlers.registry.run_one(&query.service).await?;
    Ok(Json(result))
}

#[instrument(skip(handlers))]
pub async fn get_dashboard(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Json<crate::models::DashboardSnapshot> {
    Json(handlers.orchestrator.dashboard().await)
}

#[instrument(skip(handlers))]
pub async fn get_sla_report(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Json<SlaReport> {
    Json(handlers.orchestrator.dashboard().await.sla_compliance)
}

// =====================================================================================
// METRICS ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_metric_stats(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<MetricQuery>,
) -> Result<Json<MetricStats>, MonitoringError> {
    let window = Duration::from_secs(query.window_seconds.unwrap_or(DEFAULT_STATS_WINDOW_SECONDS));
    let stats = handlers.tracker.stats(&query.metric, window).await;
    Ok(Json(stats))
}

// =====================================================================================
// ALERT ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_active_alerts(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Json<Vec<Alert>> {
    Json(handlers.alerts.active_alerts().await)
}

#[instrument(skip(handlers))]
pub async fn get_alert_summary(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Json<HashMap<String, usize>> {
    Json(handlers.alerts.alert_summary().await)
}

#[instrument(skip(handlers))]
pub async fn resolve_alert(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<ResolveQuery>,
) -> Result<StatusCode, MonitoringError> {
    let resolved_by = query.resolved_by.as_deref().unwrap_or("operator");
    let resolved = handlers.alerts.resolve_alert(&query.alert_id, resolved_by).await;

    if resolved {
        info!("alert {} resolved by {}", query.alert_id, resolved_by);
        Ok(StatusCode::OK)
    } else {
        Err(MonitoringError::AlertNotResolvable(query.alert_id))
    }
}

// =====================================================================================
// ERROR RESPONSE IMPLEMENTATION
// =====================================================================================

impl IntoResponse for MonitoringError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            MonitoringError::UnknownService(_) | MonitoringError::AlertNotResolvable(_) => {
                StatusCode::NOT_FOUND
            }
            MonitoringError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        (
            status,
            Json(serde_json::json!({
                "error": self.to_string(),
                "timestamp": chrono::Utc::now()
            })),
        )
            .into_response()
    }
}
