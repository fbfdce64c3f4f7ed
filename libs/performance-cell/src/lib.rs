// =====================================================================================
// PERFORMANCE CELL - ROLLING-WINDOW METRICS WITH PERCENTILE STATS
// =====================================================================================

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_SERIES_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub tags: HashMap<String, String>,
}

/// Windowed summary for one metric series. `min`/`max` are `None` when no
/// points fall inside the window; the percentile fields are zero-filled.
#[derive(Debug, Clone, Serialize)]
pub struct MetricStats {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

impl MetricStats {
    fn empty() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            mean: 0.0,
            median: 0.0,
            p95: 0.0,
            p99: 0.0,
        }
    }
}

/// Bounded in-memory metric store. One fixed-capacity ring buffer per metric
/// name; appending past capacity silently evicts the oldest point. Recording
/// never fails and never blocks beyond the internal lock.
#[derive(Debug)]
pub struct PerformanceTracker {
    capacity: usize,
    series: RwLock<HashMap<String, VecDeque<MetricPoint>>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SERIES_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record(&self, metric: &str, value: f64, tags: HashMap<String, String>) {
        let point = MetricPoint {
            timestamp: Utc::now(),
            value,
            tags,
        };

        let mut series = self.series.write().await;
        let buffer = series
            .entry(metric.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(point);
        debug!(metric, value, "recorded metric point");
    }

    /// Stats for points with `timestamp >= now - window`. An unknown metric
    /// or an empty window yields the zero-filled summary, never an error.
    pub async fn stats(&self, metric: &str, window: Duration) -> MetricStats {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::MAX);

        let series = self.series.read().await;
        let mut values: Vec<f64> = match series.get(metric) {
            Some(buffer) => buffer
                .iter()
                .filter(|p| p.timestamp >= cutoff)
                .map(|p| p.value)
                .collect(),
            None => Vec::new(),
        };

        if values.is_empty() {
            return MetricStats::empty();
        }

        values.sort_by(|a, b| a.total_cmp(b));
        let count = values.len();
        let sum: f64 = values.iter().sum();

        MetricStats {
            count,
            min: values.first().copied(),
            max: values.last().copied(),
            mean: sum / count as f64,
            median: nearest_rank(&values, 50.0),
            p95: nearest_rank(&values, 95.0),
            p99: nearest_rank(&values, 99.0),
        }
    }

    /// Number of points currently buffered for a metric, window-independent.
    pub async fn series_len(&self, metric: &str) -> usize {
        self.series
            .read()
            .await
            .get(metric)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub async fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile over ascending `values`:
/// `index = floor(p/100 * n)` clamped to `n - 1`. Selects an actual data
/// point; no interpolation.
fn nearest_rank(values: &[f64], percentile: f64) -> f64 {
    let n = values.len();
    let index = ((percentile / 100.0) * n as f64).floor() as usize;
    values[index.min(n - 1)]
}
