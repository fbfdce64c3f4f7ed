use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alert_cell::AlertManager;
use chrono::Utc;
use health_cell::{HealthCheckRegistry, HealthStatus, SystemHealth};
use performance_cell::PerformanceTracker;
use shared_config::AppConfig;
use sla_cell::SlaEvaluator;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::models::DashboardSnapshot;

/// Owns the background monitoring loop and aggregates the dashboard view.
///
/// Lifecycle is Stopped -> Running -> Stopped. `start` is idempotent and
/// `stop` waits for the in-flight cycle to finish; checks are bounded by
/// their own timeouts and never killed mid-probe.
pub struct MonitoringOrchestrator {
    interval: Duration,
    backoff: Duration,
    stale_after: chrono::Duration,
    stats_window: Duration,
    registry: Arc<HealthCheckRegistry>,
    tracker: Arc<PerformanceTracker>,
    alerts: Arc<AlertManager>,
    sla: Arc<SlaEvaluator>,
    is_shutdown: RwLock<bool>,
    shutdown_notify: Notify,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitoringOrchestrator {
    pub fn new(
        config: &AppConfig,
        registry: Arc<HealthCheckRegistry>,
        tracker: Arc<PerformanceTracker>,
        alerts: Arc<AlertManager>,
        sla: Arc<SlaEvaluator>,
    ) -> Self {
        Self {
            interval: Duration::from_secs(config.monitor_interval_seconds),
            backoff: Duration::from_secs(config.cycle_backoff_seconds),
            stale_after: chrono::Duration::hours(config.alert_stale_after_hours),
            stats_window: Duration::from_secs(config.sla_latency_window_minutes as u64 * 60),
            registry,
            tracker,
            alerts,
            sla,
            is_shutdown: RwLock::new(false),
            shutdown_notify: Notify::new(),
            loop_handle: Mutex::new(None),
        }
    }

    /// Spawns the background loop. Calling `start` on a running
    /// orchestrator is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut slot = self.loop_handle.lock().await;
        if slot.is_some() {
            debug!("monitoring loop already running");
            return;
        }

        *self.is_shutdown.write().await = false;
        let orchestrator = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            orchestrator.monitor_loop().await;
        }));
        info!(interval_seconds = self.interval.as_secs(), "monitoring loop started");
    }

    /// Signals cancellation and waits for the loop to exit. The current
    /// cycle finishes its sweep before the loop observes the flag.
    pub async fn stop(&self) {
        let handle = self.loop_handle.lock().await.take();
        let Some(handle) = handle else {
            debug!("monitoring loop not running");
            return;
        };

        *self.is_shutdown.write().await = true;
        self.shutdown_notify.notify_one();

        if let Err(e) = handle.await {
            error!("monitoring loop terminated abnormally: {}", e);
        }
        info!("monitoring loop stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.loop_handle.lock().await.is_some()
    }

    async fn monitor_loop(self: Arc<Self>) {
        loop {
            if *self.is_shutdown.read().await {
                break;
            }

            // The cycle runs as its own task so a panic inside it is
            // contained and the loop survives with a backoff.
            let orchestrator = Arc::clone(&self);
            let cycle = tokio::spawn(async move { orchestrator.run_cycle().await });

            let delay = match cycle.await {
                Ok(_) => self.interval,
                Err(e) => {
                    error!("monitoring cycle failed: {}", e);
                    self.backoff
                }
            };

            if *self.is_shutdown.read().await {
                break;
            }
            tokio::select! {
                _ = self.shutdown_notify.notified() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("monitoring loop exited");
    }

    /// One monitoring cycle: full check sweep, SLA evaluation, stale alert
    /// sweep.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> SystemHealth {
        let health = self.registry.run_all().await;
        debug!(
            overall = ?health.overall_status,
            services = health.services.len(),
            "check sweep complete"
        );

        let report = self.sla.evaluate().await;
        if !report.compliant {
            debug!("cycle observed SLA violation");
        }

        let swept = self.alerts.resolve_stale(self.stale_after).await;
        if swept > 0 {
            debug!(count = swept, "stale alerts auto-resolved");
        }

        health
    }

    /// Consolidated snapshot for the dashboard endpoint. Built from the
    /// last known results; always structurally complete.
    pub async fn dashboard(&self) -> DashboardSnapshot {
        let services = self.registry.last_results().await;
        let overall_status = services
            .values()
            .map(|r| r.status)
            .max_by_key(HealthStatus::severity_rank)
            .unwrap_or(HealthStatus::Healthy);

        let mut performance = HashMap::new();
        for metric in self.tracker.metric_names().await {
            let stats = self.tracker.stats(&metric, self.stats_window).await;
            performance.insert(metric, stats);
        }

        DashboardSnapshot {
            overall_status,
            services,
            performance,
            alerts: self.alerts.recent_alerts(10).await,
            sla_compliance: self.sla.evaluate().await,
            circuit_breakers: self.registry.breaker_states().await,
            generated_at: Utc::now(),
        }
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
