use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alert_cell::{AlertManager, AlertSeverity};
use breaker_cell::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
use chrono::Utc;
use performance_cell::PerformanceTracker;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::models::{
    CheckResult, HealthHistoryEntry, HealthStatus, ProbeOutcome, RegistryError, ServiceType,
    SystemHealth,
};
use crate::probes::HealthProbe;

/// Aggregate latency series fed by every check run; the SLA evaluator reads
/// its p95.
pub const AGGREGATE_LATENCY_METRIC: &str = "health_response_time";
pub const TOTAL_CHECKS_METRIC: &str = "health_checks_total";
pub const CHECK_ERRORS_METRIC: &str = "health_check_errors";

pub const CIRCUIT_OPEN_ERROR: &str = "circuit breaker open";

// 24h of history at the default 30s cadence.
const HISTORY_CAPACITY: usize = 2880;

/// Latency cutoffs for checks that report neither an explicit status nor an
/// error. Product policy, injected from configuration.
#[derive(Debug, Clone, Copy)]
pub struct LatencyThresholds {
    pub degraded_ms: u64,
    pub unhealthy_ms: u64,
}

impl Default for LatencyThresholds {
    fn default() -> Self {
        Self {
            degraded_ms: 2000,
            unhealthy_ms: 5000,
        }
    }
}

/// Per-service check definition. Immutable after registration except the
/// `enabled` flag, which is flipped through the registry.
#[derive(Clone)]
pub struct HealthCheckSpec {
    pub service: String,
    pub service_type: ServiceType,
    pub probe: Arc<dyn HealthProbe>,
    pub timeout: Duration,
    pub interval: Duration,
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub critical: bool,
    pub enabled: bool,
}

impl HealthCheckSpec {
    pub fn new(
        service: impl Into<String>,
        service_type: ServiceType,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            service: service.into(),
            service_type,
            probe,
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(30),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            critical: service_type.is_critical_tier(),
            enabled: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_breaker(mut self, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        self.failure_threshold = failure_threshold;
        self.recovery_timeout = recovery_timeout;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

struct RegisteredCheck {
    spec: HealthCheckSpec,
    breaker: Arc<CircuitBreaker>,
}

/// Holds the per-service check definitions, executes them through their
/// circuit breakers and classifies the outcomes.
pub struct HealthCheckRegistry {
    thresholds: LatencyThresholds,
    tracker: Arc<PerformanceTracker>,
    alerts: Arc<AlertManager>,
    checks: RwLock<HashMap<String, RegisteredCheck>>,
    last_results: RwLock<HashMap<String, CheckResult>>,
    history: RwLock<VecDeque<HealthHistoryEntry>>,
}

impl HealthCheckRegistry {
    pub fn new(
        thresholds: LatencyThresholds,
        tracker: Arc<PerformanceTracker>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            thresholds,
            tracker,
            alerts,
            checks: RwLock::new(HashMap::new()),
            last_results: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Registers a check and its paired circuit breaker. A duplicate service
    /// name is a configuration error, surfaced synchronously.
    pub async fn register(&self, spec: HealthCheckSpec) -> Result<(), RegistryError> {
        let mut checks = self.checks.write().await;
        if checks.contains_key(&spec.service) {
            return Err(RegistryError::DuplicateService(spec.service));
        }

        let breaker = Arc::new(CircuitBreaker::new(
            spec.service.clone(),
            CircuitBreakerConfig {
                failure_threshold: spec.failure_threshold,
                recovery_timeout: spec.recovery_timeout,
            },
        ));

        info!(
            service = %spec.service,
            service_type = ?spec.service_type,
            critical = spec.critical,
            "registered health check"
        );
        checks.insert(spec.service.clone(), RegisteredCheck { spec, breaker });
        Ok(())
    }

    pub async fn set_enabled(&self, service: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut checks = self.checks.write().await;
        let check = checks
            .get_mut(service)
            .ok_or_else(|| RegistryError::UnknownService(service.to_string()))?;
        check.spec.enabled = enabled;
        Ok(())
    }

    /// Executes one check through its breaker. A circuit-open rejection
    /// short-circuits without invoking the probe. `run_one` ignores the
    /// enabled flag: an explicit request wins over it.
    #[instrument(skip(self))]
    pub async fn run_one(&self, service: &str) -> Result<CheckResult, RegistryError> {
        let (probe, timeout, critical, breaker) = {
            let checks = self.checks.read().await;
            let check = checks
                .get(service)
                .ok_or_else(|| RegistryError::UnknownService(service.to_string()))?;
            (
                check.spec.probe.clone(),
                check.spec.timeout,
                check.spec.critical,
                check.breaker.clone(),
            )
        };

        let thresholds = self.thresholds;
        let service_name = service.to_string();
        let call = breaker
            .call(move || async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(timeout, probe.probe()).await {
                    Ok(outcome) => outcome,
                    Err(_) => ProbeOutcome::failed(format!(
                        "probe timed out after {}ms",
                        timeout.as_millis()
                    )),
                };
                let elapsed_ms = outcome
                    .response_time_ms
                    .unwrap_or_else(|| started.elapsed().as_millis() as u64);
                let status = classify(&outcome, elapsed_ms, thresholds);
                let result = CheckResult {
                    service: service_name,
                    status,
                    response_time_ms: elapsed_ms,
                    last_checked: Utc::now(),
                    error: outcome.error,
                    details: outcome.details,
                };
                // Unhealthy and Critical outcomes count as breaker failures.
                if matches!(status, HealthStatus::Unhealthy | HealthStatus::Critical) {
                    Err(result)
                } else {
                    Ok(result)
                }
            })
            .await;

        let (result, probe_ran) = match call {
            Ok(result) => (result, true),
            Err(BreakerError::Inner(result)) => (result, true),
            Err(BreakerError::Open) => {
                warn!(service, "check short-circuited by open breaker");
                (
                    CheckResult {
                        service: service.to_string(),
                        status: HealthStatus::Unhealthy,
                        response_time_ms: 0,
                        last_checked: Utc::now(),
                        error: Some(CIRCUIT_OPEN_ERROR.to_string()),
                        details: HashMap::from([(
                            "circuit_open".to_string(),
                            serde_json::json!(true),
                        )]),
                    },
                    false,
                )
            }
        };

        self.record_check_metrics(service, &result, probe_ran).await;

        if probe_ran && critical && result.error.is_some() {
            let metadata = HashMap::from([
                ("status".to_string(), serde_json::json!(result.status)),
                (
                    "response_time_ms".to_string(),
                    serde_json::json!(result.response_time_ms),
                ),
            ]);
            self.alerts
                .create_alert(
                    service,
                    AlertSeverity::Critical,
                    &format!("{} health check failed", service),
                    result.error.as_deref().unwrap_or("unknown error"),
                    metadata,
                )
                .await;
        }

        self.last_results
            .write()
            .await
            .insert(service.to_string(), result.clone());
        Ok(result)
    }

    /// The latency and error series only hold samples from probes that
    /// actually ran; a circuit-open short-circuit counts toward totals but
    /// contributes neither. The underlying probe failures were already
    /// recorded on the calls that opened the circuit.
    async fn record_check_metrics(&self, service: &str, result: &CheckResult, probe_ran: bool) {
        let tags = HashMap::from([("service".to_string(), service.to_string())]);

        self.tracker
            .record(TOTAL_CHECKS_METRIC, 1.0, HashMap::new())
            .await;
        if !probe_ran {
            return;
        }

        let elapsed = result.response_time_ms as f64;
        self.tracker
            .record(&format!("{}_response_time", service), elapsed, tags.clone())
            .await;
        self.tracker
            .record(AGGREGATE_LATENCY_METRIC, elapsed, tags.clone())
            .await;

        if result.error.is_some() {
            self.tracker
                .record(&format!("{}_errors", service), 1.0, tags)
                .await;
            self.tracker
                .record(CHECK_ERRORS_METRIC, 1.0, HashMap::new())
                .await;
        }
    }

    /// Runs every enabled check concurrently and aggregates worst-of.
    /// A panicking check is captured as an Unhealthy result and never aborts
    /// its siblings; aggregation waits for all of them.
    #[instrument(skip(self))]
    pub async fn run_all(self: &Arc<Self>) -> SystemHealth {
        let enabled: Vec<String> = {
            let checks = self.checks.read().await;
            checks
                .values()
                .filter(|c| c.spec.enabled)
                .map(|c| c.spec.service.clone())
                .collect()
        };

        let mut handles = Vec::with_capacity(enabled.len());
        for service in enabled {
            let registry = Arc::clone(self);
            let name = service.clone();
            handles.push((
                service,
                tokio::spawn(async move { registry.run_one(&name).await }),
            ));
        }

        let mut services = HashMap::new();
        for (service, handle) in handles {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => failure_result(&service, format!("check failed: {}", e)),
                Err(join_err) => {
                    error!(service = %service, "health check task panicked: {}", join_err);
                    failure_result(&service, format!("health check panicked: {}", join_err))
                }
            };
            services.insert(service, result);
        }

        let overall_status = services
            .values()
            .map(|r| r.status)
            .max_by_key(HealthStatus::severity_rank)
            .unwrap_or(HealthStatus::Healthy);
        let checked_at = Utc::now();

        {
            let mut history = self.history.write().await;
            if history.len() == HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(HealthHistoryEntry {
                timestamp: checked_at,
                overall_status,
            });
        }

        SystemHealth {
            overall_status,
            services,
            checked_at,
        }
    }

    pub async fn last_results(&self) -> HashMap<String, CheckResult> {
        self.last_results.read().await.clone()
    }

    /// History entries with `timestamp >= now - window`, oldest first.
    pub async fn history_window(&self, window: Duration) -> Vec<HealthHistoryEntry> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::MAX);
        self.history
            .read()
            .await
            .iter()
            .filter(|entry| entry.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub async fn breaker_states(&self) -> HashMap<String, CircuitBreakerSnapshot> {
        let checks = self.checks.read().await;
        checks
            .iter()
            .map(|(name, check)| (name.clone(), check.breaker.snapshot()))
            .collect()
    }

    pub async fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checks.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

fn classify(outcome: &ProbeOutcome, elapsed_ms: u64, thresholds: LatencyThresholds) -> HealthStatus {
    if let Some(raw) = &outcome.status {
        if let Some(status) = HealthStatus::from_probe_str(raw) {
            return status;
        }
    }
    if outcome.error.is_some() {
        return HealthStatus::Unhealthy;
    }
    if elapsed_ms > thresholds.unhealthy_ms {
        HealthStatus::Unhealthy
    } else if elapsed_ms > thresholds.degraded_ms {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn failure_result(service: &str, error: String) -> CheckResult {
    CheckResult {
        service: service.to_string(),
        status: HealthStatus::Unhealthy,
        response_time_ms: 0,
        last_checked: Utc::now(),
        error: Some(error),
        details: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::FnProbe;
    use assert_matches::assert_matches;

    fn registry() -> Arc<HealthCheckRegistry> {
        Arc::new(HealthCheckRegistry::new(
            LatencyThresholds::default(),
            Arc::new(PerformanceTracker::new()),
            Arc::new(AlertManager::new()),
        ))
    }

    fn static_probe(outcome: ProbeOutcome) -> Arc<dyn HealthProbe> {
        Arc::new(FnProbe::new(move || {
            let outcome = outcome.clone();
            async move { outcome }
        }))
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = registry();
        let spec = HealthCheckSpec::new(
            "db",
            ServiceType::Database,
            static_probe(ProbeOutcome::healthy()),
        );
        registry.register(spec.clone()).await.unwrap();
        assert_matches!(
            registry.register(spec).await,
            Err(RegistryError::DuplicateService(_))
        );
    }

    #[tokio::test]
    async fn unknown_service_is_an_error() {
        let registry = registry();
        assert_matches!(
            registry.run_one("ghost").await,
            Err(RegistryError::UnknownService(_))
        );
    }

    #[tokio::test]
    async fn explicit_status_wins_over_heuristics() {
        let registry = registry();
        registry
            .register(HealthCheckSpec::new(
                "api",
                ServiceType::ExternalApi,
                static_probe(ProbeOutcome::healthy().with_status("DEGRADED")),
            ))
            .await
            .unwrap();

        let result = registry.run_one("api").await.unwrap();
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn latency_heuristics_classify_unlabeled_outcomes() {
        let registry = registry();
        for (service, latency, expected) in [
            ("fast", 100, HealthStatus::Healthy),
            ("slow", 3000, HealthStatus::Degraded),
            ("stuck", 6000, HealthStatus::Unhealthy),
        ] {
            let outcome = ProbeOutcome {
                response_time_ms: Some(latency),
                ..Default::default()
            };
            registry
                .register(HealthCheckSpec::new(
                    service,
                    ServiceType::Internal,
                    static_probe(outcome),
                ))
                .await
                .unwrap();

            let result = registry.run_one(service).await.unwrap();
            assert_eq!(result.status, expected, "service {}", service);
        }
    }

    #[tokio::test]
    async fn probe_error_classifies_unhealthy() {
        let registry = registry();
        registry
            .register(HealthCheckSpec::new(
                "cache",
                ServiceType::Cache,
                static_probe(ProbeOutcome::failed("connection refused")),
            ))
            .await
            .unwrap();

        let result = registry.run_one("cache").await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn worst_of_aggregation_wins_regardless_of_order() {
        let registry = registry();
        for (service, status) in [
            ("a", "healthy"),
            ("b", "critical"),
            ("c", "healthy"),
            ("d", "degraded"),
        ] {
            registry
                .register(HealthCheckSpec::new(
                    service,
                    ServiceType::Internal,
                    static_probe(ProbeOutcome::healthy().with_status(status)),
                ))
                .await
                .unwrap();
        }

        // Map iteration order varies; worst-of must not care.
        for _ in 0..3 {
            let health = registry.run_all().await;
            assert_eq!(health.overall_status, HealthStatus::Critical);
            assert_eq!(health.services.len(), 4);
        }
    }

    #[tokio::test]
    async fn panicking_check_does_not_abort_siblings() {
        let registry = registry();
        registry
            .register(HealthCheckSpec::new(
                "stable",
                ServiceType::Internal,
                static_probe(ProbeOutcome::healthy()),
            ))
            .await
            .unwrap();
        registry
            .register(HealthCheckSpec::new(
                "flaky",
                ServiceType::Internal,
                Arc::new(FnProbe::new(|| async { panic!("probe bug") })),
            ))
            .await
            .unwrap();

        let health = registry.run_all().await;
        assert_eq!(health.services["stable"].status, HealthStatus::Healthy);
        assert_eq!(health.services["flaky"].status, HealthStatus::Unhealthy);
        assert!(health.services["flaky"]
            .error
            .as_deref()
            .unwrap()
            .contains("panicked"));
        assert_eq!(health.overall_status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn disabled_checks_are_skipped_by_run_all() {
        let registry = registry();
        registry
            .register(HealthCheckSpec::new(
                "on",
                ServiceType::Internal,
                static_probe(ProbeOutcome::healthy()),
            ))
            .await
            .unwrap();
        registry
            .register(HealthCheckSpec::new(
                "off",
                ServiceType::Internal,
                static_probe(ProbeOutcome::failed("should not run")),
            ))
            .await
            .unwrap();
        registry.set_enabled("off", false).await.unwrap();

        let health = registry.run_all().await;
        assert_eq!(health.services.len(), 1);
        assert_eq!(health.overall_status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn check_latency_feeds_the_tracker() {
        let tracker = Arc::new(PerformanceTracker::new());
        let registry = Arc::new(HealthCheckRegistry::new(
            LatencyThresholds::default(),
            tracker.clone(),
            Arc::new(AlertManager::new()),
        ));
        registry
            .register(HealthCheckSpec::new(
                "db",
                ServiceType::Database,
                static_probe(ProbeOutcome::healthy()),
            ))
            .await
            .unwrap();

        registry.run_one("db").await.unwrap();

        assert_eq!(tracker.series_len("db_response_time").await, 1);
        assert_eq!(tracker.series_len(AGGREGATE_LATENCY_METRIC).await, 1);
        assert_eq!(tracker.series_len(TOTAL_CHECKS_METRIC).await, 1);
        assert_eq!(tracker.series_len(CHECK_ERRORS_METRIC).await, 0);
    }

    #[tokio::test]
    async fn short_circuited_check_counts_toward_totals_only() {
        let tracker = Arc::new(PerformanceTracker::new());
        let registry = Arc::new(HealthCheckRegistry::new(
            LatencyThresholds::default(),
            tracker.clone(),
            Arc::new(AlertManager::new()),
        ));
        registry
            .register(
                HealthCheckSpec::new(
                    "upstream",
                    ServiceType::ExternalApi,
                    static_probe(ProbeOutcome::failed("timeout")),
                )
                .with_breaker(1, Duration::from_secs(60)),
            )
            .await
            .unwrap();

        // The probe failure itself is a real error sample.
        registry.run_one("upstream").await.unwrap();
        assert_eq!(tracker.series_len("upstream_errors").await, 1);
        assert_eq!(tracker.series_len(CHECK_ERRORS_METRIC).await, 1);

        // The short-circuit is counted as a check, but the probe never ran:
        // no new latency or error samples.
        let result = registry.run_one("upstream").await.unwrap();
        assert!(result.is_circuit_open());
        assert_eq!(tracker.series_len(TOTAL_CHECKS_METRIC).await, 2);
        assert_eq!(tracker.series_len("upstream_response_time").await, 1);
        assert_eq!(tracker.series_len("upstream_errors").await, 1);
        assert_eq!(tracker.series_len(CHECK_ERRORS_METRIC).await, 1);
    }

    #[tokio::test]
    async fn critical_service_failure_raises_critical_alert() {
        let alerts = Arc::new(AlertManager::new());
        let registry = Arc::new(HealthCheckRegistry::new(
            LatencyThresholds::default(),
            Arc::new(PerformanceTracker::new()),
            alerts.clone(),
        ));
        registry
            .register(HealthCheckSpec::new(
                "db",
                ServiceType::Database,
                static_probe(ProbeOutcome::failed("connection refused")),
            ))
            .await
            .unwrap();
        registry
            .register(HealthCheckSpec::new(
                "widget-api",
                ServiceType::ExternalApi,
                static_probe(ProbeOutcome::failed("503")),
            ))
            .await
            .unwrap();

        registry.run_one("db").await.unwrap();
        registry.run_one("widget-api").await.unwrap();

        let active = alerts.active_alerts().await;
        // Only the critical-tier service pages.
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].service, "db");
        assert_eq!(active[0].severity, alert_cell::AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn breaker_short_circuits_after_threshold_and_recovers() {
        let registry = registry();
        let probes_run = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = probes_run.clone();
        registry
            .register(
                HealthCheckSpec::new(
                    "upstream",
                    ServiceType::ExternalApi,
                    Arc::new(FnProbe::new(move || {
                        let counter = counter.clone();
                        async move {
                            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            ProbeOutcome::failed("timeout").with_status("unhealthy")
                        }
                    })),
                )
                .with_breaker(3, Duration::from_millis(50)),
            )
            .await
            .unwrap();

        for _ in 0..3 {
            let result = registry.run_one("upstream").await.unwrap();
            assert_eq!(result.status, HealthStatus::Unhealthy);
            assert!(!result.is_circuit_open());
        }
        assert_eq!(probes_run.load(std::sync::atomic::Ordering::SeqCst), 3);

        // 4th call must short-circuit without invoking the probe.
        let short_circuited = registry.run_one("upstream").await.unwrap();
        assert_eq!(short_circuited.status, HealthStatus::Unhealthy);
        assert!(short_circuited.is_circuit_open());
        assert_eq!(short_circuited.error.as_deref(), Some(CIRCUIT_OPEN_ERROR));
        assert_eq!(probes_run.load(std::sync::atomic::Ordering::SeqCst), 3);

        // After the recovery timeout the probe is invoked again.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let retried = registry.run_one("upstream").await.unwrap();
        assert!(!retried.is_circuit_open());
        assert_eq!(probes_run.load(std::sync::atomic::Ordering::SeqCst), 4);
    }
}
