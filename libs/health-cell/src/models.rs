use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl HealthStatus {
    /// Priority for worst-of aggregation: Critical > Unhealthy > Degraded >
    /// Healthy.
    pub fn severity_rank(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
            HealthStatus::Critical => 3,
        }
    }

    /// Counts as uptime for SLA purposes. Degraded service still serves.
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Maps an explicit probe-reported status string. Unknown strings return
    /// None so the caller falls back to error/latency heuristics.
    pub fn from_probe_str(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "healthy" => Some(HealthStatus::Healthy),
            "degraded" | "warning" => Some(HealthStatus::Degraded),
            "unhealthy" | "error" => Some(HealthStatus::Unhealthy),
            "critical" => Some(HealthStatus::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Database,
    Cache,
    Queue,
    ExternalApi,
    Internal,
}

impl ServiceType {
    /// Tiers whose probe failures page someone. Database outages cascade
    /// into everything else, so they default to critical.
    pub fn is_critical_tier(&self) -> bool {
        matches!(self, ServiceType::Database)
    }
}

/// Raw result of one probe invocation, collaborator-supplied. Unrecognized
/// metadata passes through unchanged into the check result details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub status: Option<String>,
    pub error: Option<String>,
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl ProbeOutcome {
    pub fn healthy() -> Self {
        Self {
            status: Some("healthy".to_string()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub service: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_checked: DateTime<Utc>,
    pub error: Option<String>,
    pub details: HashMap<String, serde_json::Value>,
}

impl CheckResult {
    pub fn is_circuit_open(&self) -> bool {
        self.details
            .get("circuit_open")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Aggregate of one full check sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub services: HashMap<String, CheckResult>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub overall_status: HealthStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service already registered: {0}")]
    DuplicateService(String),
    #[error("unknown service: {0}")]
    UnknownService(String),
}
