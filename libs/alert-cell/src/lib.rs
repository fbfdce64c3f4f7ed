// =====================================================================================
// ALERT CELL - SEVERITY-TIERED ALERTING WITH PLUGGABLE DELIVERY
// =====================================================================================

pub mod manager;
pub mod models;
pub mod sink;

pub use manager::{AlertHandler, AlertManager};
pub use models::{Alert, AlertError, AlertSeverity};
pub use sink::{AlertSink, RedisAlertSink};
