use std::collections::HashMap;

use breaker_cell::CircuitBreakerSnapshot;
use chrono::{DateTime, Utc};
use health_cell::{CheckResult, HealthStatus, SystemHealth};
use performance_cell::MetricStats;
use serde::{Deserialize, Serialize};
use sla_cell::SlaReport;

/// Consolidated point-in-time view of the whole monitoring stack.
/// Best-effort by contract: every field is always present, with empty maps
/// before the first check sweep.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub overall_status: HealthStatus,
    pub services: HashMap<String, CheckResult>,
    pub performance: HashMap<String, MetricStats>,
    pub alerts: Vec<alert_cell::Alert>,
    pub sla_compliance: SlaReport,
    pub circuit_breakers: HashMap<String, CircuitBreakerSnapshot>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub healthy_services: u32,
    pub degraded_services: u32,
    pub unhealthy_services: u32,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<SystemHealth>,
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    pub include_details: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ComponentQuery {
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    pub metric: String,
    pub window_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub alert_id: String,
    pub resolved_by: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("alert not found or already resolved: {0}")]
    AlertNotResolvable(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<health_cell::RegistryError> for MonitoringError {
    fn from(err: health_cell::RegistryError) -> Self {
        match err {
            health_cell::RegistryError::UnknownService(s) => MonitoringError::UnknownService(s),
            health_cell::RegistryError::DuplicateService(s) => {
                MonitoringError::InvalidRequest(format!("service already registered: {}", s))
            }
        }
    }
}
