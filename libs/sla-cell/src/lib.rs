// =====================================================================================
// SLA CELL - COMPLIANCE EVALUATION OVER TRACKED METRICS AND HEALTH HISTORY
// =====================================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use health_cell::registry::{AGGREGATE_LATENCY_METRIC, CHECK_ERRORS_METRIC, TOTAL_CHECKS_METRIC};
use health_cell::HealthCheckRegistry;
use performance_cell::PerformanceTracker;
use serde::Serialize;
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
pub struct SlaTargets {
    pub p95_response_time_ms: f64,
    pub uptime_percent: f64,
    pub error_rate_percent: f64,
    /// Trailing window for latency and error-rate evaluation.
    pub evaluation_window: Duration,
    /// Trailing window for uptime, conventionally 24h.
    pub uptime_window: Duration,
}

impl Default for SlaTargets {
    fn default() -> Self {
        Self {
            p95_response_time_ms: 60_000.0,
            uptime_percent: 99.5,
            error_rate_percent: 1.0,
            evaluation_window: Duration::from_secs(60 * 60),
            uptime_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlaCheck {
    pub target: f64,
    pub actual: f64,
    pub compliant: bool,
}

/// Point-in-time compliance snapshot. Computed per call, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct SlaReport {
    pub response_time: SlaCheck,
    pub uptime: SlaCheck,
    pub error_rate: SlaCheck,
    pub compliant: bool,
    pub evaluated_at: DateTime<Utc>,
}

pub struct SlaEvaluator {
    targets: SlaTargets,
    tracker: Arc<PerformanceTracker>,
    registry: Arc<HealthCheckRegistry>,
}

impl SlaEvaluator {
    pub fn new(
        targets: SlaTargets,
        tracker: Arc<PerformanceTracker>,
        registry: Arc<HealthCheckRegistry>,
    ) -> Self {
        Self {
            targets,
            tracker,
            registry,
        }
    }

    #[instrument(skip(self))]
    pub async fn evaluate(&self) -> SlaReport {
        let response_time = self.evaluate_response_time().await;
        let uptime = self.evaluate_uptime().await;
        let error_rate = self.evaluate_error_rate().await;

        let compliant = response_time.compliant && uptime.compliant && error_rate.compliant;
        if !compliant {
            warn!(
                p95_ms = response_time.actual,
                uptime_percent = uptime.actual,
                error_rate_percent = error_rate.actual,
                "SLA compliance violated"
            );
        }

        SlaReport {
            response_time,
            uptime,
            error_rate,
            compliant,
            evaluated_at: Utc::now(),
        }
    }

    async fn evaluate_response_time(&self) -> SlaCheck {
        let stats = self
            .tracker
            .stats(AGGREGATE_LATENCY_METRIC, self.targets.evaluation_window)
            .await;
        SlaCheck {
            target: self.targets.p95_response_time_ms,
            actual: stats.p95,
            compliant: stats.p95 < self.targets.p95_response_time_ms,
        }
    }

    /// Uptime is the fraction of check sweeps whose overall status was
    /// Healthy or Degraded. An empty history is full uptime: no evidence of
    /// downtime.
    async fn evaluate_uptime(&self) -> SlaCheck {
        let history = self
            .registry
            .history_window(self.targets.uptime_window)
            .await;

        let actual = if history.is_empty() {
            100.0
        } else {
            let up = history.iter().filter(|e| e.overall_status.is_up()).count();
            (up as f64 / history.len() as f64) * 100.0
        };

        SlaCheck {
            target: self.targets.uptime_percent,
            actual,
            compliant: actual >= self.targets.uptime_percent,
        }
    }

    /// Error rate over the evaluation window. Zero checks is defined as a
    /// 0% error rate, never a division by zero.
    async fn evaluate_error_rate(&self) -> SlaCheck {
        let errors = self
            .tracker
            .stats(CHECK_ERRORS_METRIC, self.targets.evaluation_window)
            .await
            .count;
        let total = self
            .tracker
            .stats(TOTAL_CHECKS_METRIC, self.targets.evaluation_window)
            .await
            .count;

        let actual = if total == 0 {
            0.0
        } else {
            (errors as f64 / total as f64) * 100.0
        };

        SlaCheck {
            target: self.targets.error_rate_percent,
            actual,
            compliant: actual < self.targets.error_rate_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_cell::AlertManager;
    use health_cell::{FnProbe, HealthCheckSpec, LatencyThresholds, ProbeOutcome, ServiceType};
    use std::collections::HashMap;

    fn stack() -> (Arc<PerformanceTracker>, Arc<HealthCheckRegistry>) {
        let tracker = Arc::new(PerformanceTracker::new());
        let registry = Arc::new(HealthCheckRegistry::new(
            LatencyThresholds::default(),
            tracker.clone(),
            Arc::new(AlertManager::new()),
        ));
        (tracker, registry)
    }

    fn evaluator(
        targets: SlaTargets,
        tracker: Arc<PerformanceTracker>,
        registry: Arc<HealthCheckRegistry>,
    ) -> SlaEvaluator {
        SlaEvaluator::new(targets, tracker, registry)
    }

    #[tokio::test]
    async fn zero_checks_yield_zero_error_rate_and_compliance() {
        let (tracker, registry) = stack();
        let report = evaluator(SlaTargets::default(), tracker, registry)
            .evaluate()
            .await;

        assert_eq!(report.error_rate.actual, 0.0);
        assert!(report.error_rate.compliant);
        assert!(report.uptime.compliant);
        assert_eq!(report.uptime.actual, 100.0);
        assert!(report.compliant);
    }

    #[tokio::test]
    async fn p95_violation_is_detected() {
        let (tracker, registry) = stack();
        for latency in [10.0, 20.0, 5000.0] {
            tracker
                .record(AGGREGATE_LATENCY_METRIC, latency, HashMap::new())
                .await;
        }

        let targets = SlaTargets {
            p95_response_time_ms: 1000.0,
            ..Default::default()
        };
        let report = evaluator(targets, tracker, registry).evaluate().await;

        assert_eq!(report.response_time.actual, 5000.0);
        assert!(!report.response_time.compliant);
        assert!(!report.compliant);
    }

    #[tokio::test]
    async fn uptime_reflects_health_history() {
        let (tracker, registry) = stack();
        registry
            .register(HealthCheckSpec::new(
                "db",
                ServiceType::Database,
                Arc::new(FnProbe::new(|| async { ProbeOutcome::failed("down") })),
            ))
            .await
            .unwrap();

        // Two sweeps, both with an unhealthy overall status.
        registry.run_all().await;
        registry.run_all().await;

        let report = evaluator(SlaTargets::default(), tracker, registry)
            .evaluate()
            .await;

        assert_eq!(report.uptime.actual, 0.0);
        assert!(!report.uptime.compliant);
    }

    #[tokio::test]
    async fn error_rate_counts_failed_checks() {
        let (tracker, registry) = stack();
        registry
            .register(HealthCheckSpec::new(
                "good",
                ServiceType::Internal,
                Arc::new(FnProbe::new(|| async { ProbeOutcome::healthy() })),
            ))
            .await
            .unwrap();
        registry
            .register(HealthCheckSpec::new(
                "bad",
                ServiceType::Internal,
                Arc::new(FnProbe::new(|| async { ProbeOutcome::failed("boom") })),
            ))
            .await
            .unwrap();

        registry.run_all().await;

        let targets = SlaTargets {
            error_rate_percent: 10.0,
            ..Default::default()
        };
        let report = evaluator(targets, tracker, registry).evaluate().await;

        // 1 error out of 2 checks.
        assert_eq!(report.error_rate.actual, 50.0);
        assert!(!report.error_rate.compliant);
    }
}
