// =====================================================================================
// HEALTH CELL - DEPENDENCY HEALTH CHECKS THROUGH CIRCUIT BREAKERS
// =====================================================================================

pub mod models;
pub mod probes;
pub mod registry;

pub use models::{
    CheckResult, HealthHistoryEntry, HealthStatus, ProbeOutcome, RegistryError, ServiceType,
    SystemHealth,
};
pub use probes::{FnProbe, HealthProbe, HttpProbe, RedisProbe};
pub use registry::{
    HealthCheckRegistry, HealthCheckSpec, LatencyThresholds, AGGREGATE_LATENCY_METRIC,
    CHECK_ERRORS_METRIC, CIRCUIT_OPEN_ERROR, TOTAL_CHECKS_METRIC,
};
