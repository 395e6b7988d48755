use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

const DEFAULT_CAPACITY: usize = 1000;
const SLOWEST_COUNT: usize = 5;
const RECENT_COUNT: usize = 10;

/// Timing of one HTTP attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSample {
    pub url: String,
    pub method: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Receives samples from the transport. Implementations must not block and
/// must not fail.
pub trait PerformanceSink: Send + Sync {
    fn record(&self, sample: PerformanceSample);
}

/// Discards every sample.
pub struct NoopSink;

impl PerformanceSink for NoopSink {
    fn record(&self, _sample: PerformanceSample) {}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceStats {
    pub total_requests: usize,
    pub average_response_ms: f64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub slowest_requests: Vec<PerformanceSample>,
    pub recent_requests: Vec<PerformanceSample>,
}

/// Keeps the most recent samples in a bounded ring buffer.
pub struct PerformanceMonitor {
    samples: Mutex<VecDeque<PerformanceSample>>,
    capacity: usize,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> PerformanceStats {
        let samples = self.lock();
        let total_requests = samples.len();

        if total_requests == 0 {
            return PerformanceStats {
                total_requests: 0,
                average_response_ms: 0.0,
                success_rate: 0.0,
                error_rate: 0.0,
                slowest_requests: Vec::new(),
                recent_requests: Vec::new(),
            };
        }

        let successful = samples.iter().filter(|s| s.success).count();
        let total_duration: f64 = samples.iter().map(|s| s.duration_ms).sum();
        let success_rate = successful as f64 / total_requests as f64 * 100.0;

        let mut slowest: Vec<PerformanceSample> = samples.iter().cloned().collect();
        slowest.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slowest.truncate(SLOWEST_COUNT);

        let recent = samples.iter().rev().take(RECENT_COUNT).cloned().collect();

        PerformanceStats {
            total_requests,
            average_response_ms: total_duration / total_requests as f64,
            success_rate,
            error_rate: 100.0 - success_rate,
            slowest_requests: slowest,
            recent_requests: recent,
        }
    }

    /// Oldest first.
    pub fn export(&self) -> Vec<PerformanceSample> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PerformanceSample>> {
        // A poisoned buffer only ever holds complete samples.
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PerformanceSink for PerformanceMonitor {
    fn record(&self, sample: PerformanceSample) {
        trace!(
            url = %sample.url,
            duration_ms = sample.duration_ms,
            success = sample.success,
            "Performance sample recorded"
        );

        let mut samples = self.lock();
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }
}
