use std::env;
use tracing::warn;

/// Runtime configuration for the monitoring stack.
///
/// Every threshold in here is product policy rather than algorithm: latency
/// classification cutoffs, SLA targets and loop cadence are tuned per
/// deployment through the environment, with conservative defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: Option<String>,
    /// Comma-separated `name=url` pairs of HTTP endpoints to probe.
    pub health_http_targets: Vec<(String, String)>,
    pub monitor_interval_seconds: u64,
    pub cycle_backoff_seconds: u64,
    pub check_timeout_ms: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
    pub degraded_latency_ms: u64,
    pub unhealthy_latency_ms: u64,
    pub sla_p95_target_ms: f64,
    pub sla_uptime_target_percent: f64,
    pub sla_error_rate_target_percent: f64,
    pub sla_latency_window_minutes: i64,
    pub alert_stale_after_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            redis_url: env::var("REDIS_URL").ok(),
            health_http_targets: parse_http_targets(
                env::var("HEALTH_HTTP_TARGETS").ok().as_deref(),
            ),
            monitor_interval_seconds: parse_env("MONITOR_INTERVAL_SECONDS", 30),
            cycle_backoff_seconds: parse_env("MONITOR_CYCLE_BACKOFF_SECONDS", 10),
            check_timeout_ms: parse_env("HEALTH_CHECK_TIMEOUT_MS", 5000),
            failure_threshold: parse_env("CIRCUIT_FAILURE_THRESHOLD", 5),
            recovery_timeout_seconds: parse_env("CIRCUIT_RECOVERY_TIMEOUT_SECONDS", 60),
            degraded_latency_ms: parse_env("DEGRADED_LATENCY_MS", 2000),
            unhealthy_latency_ms: parse_env("UNHEALTHY_LATENCY_MS", 5000),
            sla_p95_target_ms: parse_env("SLA_P95_TARGET_MS", 60_000.0),
            sla_uptime_target_percent: parse_env("SLA_UPTIME_TARGET_PERCENT", 99.5),
            sla_error_rate_target_percent: parse_env("SLA_ERROR_RATE_TARGET_PERCENT", 1.0),
            sla_latency_window_minutes: parse_env("SLA_LATENCY_WINDOW_MINUTES", 60),
            alert_stale_after_hours: parse_env("ALERT_STALE_AFTER_HOURS", 24),
        };

        if !config.is_redis_configured() {
            warn!("REDIS_URL not set - cache probe and alert persistence disabled");
        }

        config
    }

    pub fn is_redis_configured(&self) -> bool {
        self.redis_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            health_http_targets: Vec::new(),
            monitor_interval_seconds: 30,
            cycle_backoff_seconds: 10,
            check_timeout_ms: 5000,
            failure_threshold: 5,
            recovery_timeout_seconds: 60,
            degraded_latency_ms: 2000,
            unhealthy_latency_ms: 5000,
            sla_p95_target_ms: 60_000.0,
            sla_uptime_target_percent: 99.5,
            sla_error_rate_target_percent: 1.0,
            sla_latency_window_minutes: 60,
            alert_stale_after_hours: 24,
        }
    }
}

fn parse_http_targets(raw: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            match entry.split_once('=').map(|(n, u)| (n.trim(), u.trim())) {
                Some((name, url)) if !name.is_empty() && !url.is_empty() => {
                    Some((name.to_string(), url.to_string()))
                }
                _ => {
                    warn!("skipping malformed HEALTH_HTTP_TARGETS entry: {}", entry);
                    None
                }
            }
        })
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an unparseable value, using default", name);
            default
        }),
        Err(_) => default,
    }
}
