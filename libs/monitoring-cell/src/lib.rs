// =====================================================================================
// MONITORING CELL - ORCHESTRATION, DASHBOARD AND HTTP SURFACE
// =====================================================================================
//
// Ties the monitoring stack together:
// - Supervised background loop (checks -> SLA -> stale alert sweep)
// - Consolidated dashboard snapshot
// - Query-only HTTP endpoints over the stack
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod router;

pub use handlers::MonitoringHandlers;
pub use models::{DashboardSnapshot, HealthSummary, MonitoringError};
pub use orchestrator::MonitoringOrchestrator;
pub use router::create_monitoring_router;
