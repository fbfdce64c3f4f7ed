use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::models::{Alert, AlertSeverity};
use crate::sink::AlertSink;

/// Delivery callback for one severity tier. Errors are logged and isolated;
/// they never affect other handlers or alert storage.
pub type AlertHandler = Arc<dyn Fn(&Alert) -> anyhow::Result<()> + Send + Sync>;

const AUTO_RESOLVED_BY: &str = "auto_resolved_stale";
const SINK_TTL_SECONDS: u64 = 86_400;

pub struct AlertManager {
    alerts: RwLock<HashMap<String, Alert>>,
    handlers: RwLock<HashMap<AlertSeverity, Vec<AlertHandler>>>,
    sink: Option<Arc<dyn AlertSink>>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            sink: None,
        }
    }

    /// Attach an external write-through sink. Sink failures are logged and
    /// never affect in-memory alert state.
    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub async fn register_handler(&self, severity: AlertSeverity, handler: AlertHandler) {
        let mut handlers = self.handlers.write().await;
        handlers.entry(severity).or_default().push(handler);
    }

    #[instrument(skip(self, metadata))]
    pub async fn create_alert(
        &self,
        service: &str,
        severity: AlertSeverity,
        title: &str,
        message: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> String {
        let created_at = Utc::now();
        let id = format!("{}_{}_{}", service, severity.as_str(), created_at.timestamp());

        let alert = Alert {
            id: id.clone(),
            service: service.to_string(),
            severity,
            title: title.to_string(),
            message: message.to_string(),
            created_at,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            metadata,
        };

        match severity {
            AlertSeverity::Critical | AlertSeverity::Error => {
                error!(alert_id = %id, service, severity = severity.as_str(), "{}", title);
            }
            AlertSeverity::Warning => {
                warn!(alert_id = %id, service, "{}", title);
            }
            AlertSeverity::Info => {
                info!(alert_id = %id, service, "{}", title);
            }
        }

        self.dispatch(&alert).await;
        self.persist(&alert).await;

        let mut alerts = self.alerts.write().await;
        alerts.insert(id.clone(), alert);
        id
    }

    /// Runs registered handlers for the alert's severity in registration
    /// order. A failing handler does not stop the rest.
    async fn dispatch(&self, alert: &Alert) {
        let handlers = self.handlers.read().await;
        let Some(tier) = handlers.get(&alert.severity) else {
            return;
        };
        for (index, handler) in tier.iter().enumerate() {
            if let Err(e) = handler(alert) {
                error!(
                    alert_id = %alert.id,
                    handler = index,
                    "alert handler failed: {}", e
                );
            }
        }
    }

    async fn persist(&self, alert: &Alert) {
        let Some(sink) = &self.sink else { return };
        let key = format!("alert:{}", alert.id);
        match serde_json::to_value(alert) {
            Ok(value) => {
                if let Err(e) = sink.set(&key, value, SINK_TTL_SECONDS).await {
                    warn!(alert_id = %alert.id, "failed to persist alert: {}", e);
                }
            }
            Err(e) => warn!(alert_id = %alert.id, "failed to serialize alert: {}", e),
        }
    }

    /// One-way resolution. Returns false for unknown or already-resolved
    /// alerts instead of erroring.
    #[instrument(skip(self))]
    pub async fn resolve_alert(&self, alert_id: &str, resolved_by: &str) -> bool {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(alert_id) {
            Some(alert) if !alert.resolved => {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
                alert.resolved_by = Some(resolved_by.to_string());
                info!(alert_id, resolved_by, "alert resolved");
                true
            }
            _ => false,
        }
    }

    /// Resolves unresolved alerts older than `max_age`. Alerts stay in the
    /// store; nothing is physically deleted.
    pub async fn resolve_stale(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut alerts = self.alerts.write().await;
        let mut resolved = 0;

        for alert in alerts.values_mut() {
            if !alert.resolved && alert.created_at < cutoff {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
                alert.resolved_by = Some(AUTO_RESOLVED_BY.to_string());
                resolved += 1;
            }
        }

        if resolved > 0 {
            info!(count = resolved, "auto-resolved stale alerts");
        }
        resolved
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        let mut active: Vec<Alert> = alerts.values().filter(|a| !a.resolved).cloned().collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    /// Most recent alerts regardless of resolution state, newest first.
    pub async fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        let mut all: Vec<Alert> = alerts.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }

    pub async fn alert_summary(&self) -> HashMap<String, usize> {
        let alerts = self.alerts.read().await;
        let mut summary = HashMap::new();
        for alert in alerts.values().filter(|a| !a.resolved) {
            *summary
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn backdate_alert(&self, alert_id: &str, created_at: chrono::DateTime<Utc>) {
        let mut alerts = self.alerts.write().await;
        if let Some(alert) = alerts.get_mut(alert_id) {
            alert.created_at = created_at;
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        writes: std::sync::Mutex<Vec<(String, serde_json::Value, u64)>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn set(
            &self,
            key: &str,
            value: serde_json::Value,
            ttl_seconds: u64,
        ) -> anyhow::Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), value, ttl_seconds));
            Ok(())
        }
    }

    #[tokio::test]
    async fn alerts_write_through_to_the_sink_with_ttl() {
        let sink = Arc::new(RecordingSink::default());
        let manager = AlertManager::new().with_sink(sink.clone());

        let id = manager
            .create_alert("db", AlertSeverity::Error, "down", "no route", HashMap::new())
            .await;

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let (key, value, ttl) = &writes[0];
        assert_eq!(key, &format!("alert:{}", id));
        assert_eq!(value["service"], "db");
        assert_eq!(value["severity"], "error");
        assert_eq!(*ttl, SINK_TTL_SECONDS);
    }

    #[tokio::test]
    async fn alert_id_is_deterministic_and_traceable() {
        let manager = AlertManager::new();
        let id = manager
            .create_alert(
                "database",
                AlertSeverity::Critical,
                "db down",
                "connection refused",
                HashMap::new(),
            )
            .await;

        assert!(id.starts_with("database_critical_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn handlers_run_in_order_and_failures_are_isolated() {
        let manager = AlertManager::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o = order.clone();
        manager
            .register_handler(
                AlertSeverity::Warning,
                Arc::new(move |_| {
                    o.lock().unwrap().push("first");
                    Err(anyhow::anyhow!("pager unreachable"))
                }),
            )
            .await;
        let o = order.clone();
        manager
            .register_handler(
                AlertSeverity::Warning,
                Arc::new(move |_| {
                    o.lock().unwrap().push("second");
                    Ok(())
                }),
            )
            .await;

        let id = manager
            .create_alert("cache", AlertSeverity::Warning, "slow", "p95 high", HashMap::new())
            .await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        // Alert recorded despite the failing handler.
        assert!(manager.active_alerts().await.iter().any(|a| a.id == id));
    }

    #[tokio::test]
    async fn handlers_only_fire_for_their_severity() {
        let manager = AlertManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = fired.clone();
        manager
            .register_handler(
                AlertSeverity::Critical,
                Arc::new(move |_| {
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .await;

        manager
            .create_alert("api", AlertSeverity::Info, "note", "fyi", HashMap::new())
            .await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        manager
            .create_alert("api", AlertSeverity::Critical, "down", "500s", HashMap::new())
            .await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_is_one_way_and_idempotent_safe() {
        let manager = AlertManager::new();
        let id = manager
            .create_alert("queue", AlertSeverity::Error, "lag", "backlog", HashMap::new())
            .await;

        assert!(manager.resolve_alert(&id, "oncall").await);
        assert!(!manager.resolve_alert(&id, "oncall").await);
        assert!(!manager.resolve_alert("missing_id", "oncall").await);

        assert!(manager.active_alerts().await.is_empty());
        let resolved = &manager.recent_alerts(10).await[0];
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("oncall"));
    }

    #[tokio::test]
    async fn stale_sweep_resolves_only_old_alerts() {
        let manager = AlertManager::new();
        let old = manager
            .create_alert("db", AlertSeverity::Warning, "old", "stale", HashMap::new())
            .await;
        let fresh = manager
            .create_alert("db", AlertSeverity::Error, "fresh", "recent", HashMap::new())
            .await;

        manager
            .backdate_alert(&old, Utc::now() - Duration::hours(25))
            .await;
        manager
            .backdate_alert(&fresh, Utc::now() - Duration::hours(23))
            .await;

        let swept = manager.resolve_stale(Duration::hours(24)).await;
        assert_eq!(swept, 1);

        let active = manager.active_alerts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, fresh);

        let old_alert = manager
            .recent_alerts(10)
            .await
            .into_iter()
            .find(|a| a.id == old)
            .unwrap();
        assert_eq!(old_alert.resolved_by.as_deref(), Some(AUTO_RESOLVED_BY));
    }
}
