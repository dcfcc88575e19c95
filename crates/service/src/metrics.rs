use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of one analysis request, for [`ServiceMetrics::record_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A full engine pass ran
    Analyzed,
    /// Served from the derived cache
    CacheHit,
    /// Waited on another request's pass, then served its result
    Coalesced,
    /// Engine refused the input
    Unsupported,
    Failed,
}

/// Service-wide counters.
///
/// All operations use `Ordering::Relaxed`; `snapshot()` is not transactional
/// across fields.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests: AtomicU64,
    runs: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    unsupported: AtomicU64,
    failures: AtomicU64,
    lines: AtomicU64,
    samples: AtomicU64,
    events: AtomicU64,
    run_time_nanos: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub runs: u64,
    pub cache_hits: u64,
    pub coalesced: u64,
    pub unsupported: u64,
    pub failures: u64,
    pub lines: u64,
    pub samples: u64,
    pub events: u64,
    pub avg_run_ms: f64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_request(&self, outcome: RequestOutcome) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RequestOutcome::Analyzed => &self.runs,
            RequestOutcome::CacheHit => &self.cache_hits,
            RequestOutcome::Coalesced => &self.coalesced,
            RequestOutcome::Unsupported => &self.unsupported,
            RequestOutcome::Failed => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Volume of a completed engine pass
    #[inline]
    pub fn record_run(&self, lines: usize, samples: usize, events: usize, time_nanos: u64) {
        self.lines.fetch_add(lines as u64, Ordering::Relaxed);
        self.samples.fetch_add(samples as u64, Ordering::Relaxed);
        self.events.fetch_add(events as u64, Ordering::Relaxed);
        self.run_time_nanos.fetch_add(time_nanos, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let runs = self.runs.load(Ordering::Relaxed);
        let nanos = self.run_time_nanos.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            runs,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            avg_run_ms: if runs > 0 {
                nanos as f64 / runs as f64 / 1_000_000.0
            } else {
                0.0
            },
        }
    }
}
