use std::time::Duration;

use ahash::AHashMap;

/// Per-function call statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMetrics {
    pub name: String,
    pub call_count: u64,
    pub total_time: Duration,
}

impl FunctionMetrics {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            call_count: 0,
            total_time: Duration::ZERO,
        }
    }

    pub fn average_time(&self) -> Duration {
        if self.call_count == 0 {
            Duration::ZERO
        } else {
            self.total_time / u32::try_from(self.call_count).unwrap_or(u32::MAX)
        }
    }
}

/// A function whose call count reached a threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotFunction {
    pub name: String,
    pub call_count: u64,
}

/// Counts calls and accumulates execution time per function name.
#[derive(Debug, Default)]
pub struct CallProfiler {
    metrics: AHashMap<String, FunctionMetrics>,
}

impl CallProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the counter for `name` and returns the new count.
    pub fn record_call(&mut self, name: &str) -> u64 {
        let metrics = self
            .metrics
            .entry(name.to_string())
            .or_insert_with(|| FunctionMetrics::new(name));
        metrics.call_count += 1;
        metrics.call_count
    }

    /// Adds time to an already-profiled function; unknown names are ignored.
    pub fn record_time(&mut self, name: &str, duration: Duration) {
        if let Some(metrics) = self.metrics.get_mut(name) {
            metrics.total_time += duration;
        }
    }

    pub fn call_count(&self, name: &str) -> u64 {
        self.metrics.get(name).map_or(0, |m| m.call_count)
    }

    pub fn metrics(&self, name: &str) -> Option<&FunctionMetrics> {
        self.metrics.get(name)
    }

    /// All metrics, most-called first (ties broken by name).
    pub fn all_metrics(&self) -> Vec<FunctionMetrics> {
        let mut all: Vec<FunctionMetrics> = self.metrics.values().cloned().collect();
        all.sort_by(|a, b| {
            b.call_count
                .cmp(&a.call_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        all
    }

    pub fn hot_functions(&self, threshold: u64) -> Vec<HotFunction> {
        self.all_metrics()
            .into_iter()
            .filter(|m| m.call_count >= threshold)
            .map(|m| HotFunction {
                name: m.name,
                call_count: m.call_count,
            })
            .collect()
    }

    /// Forgets everything recorded for `name`.
    pub fn reset(&mut self, name: &str) {
        self.metrics.remove(name);
    }
}
