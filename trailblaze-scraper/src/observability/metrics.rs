use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::error;

/// Process-wide write-through counter registry. Increments land both in
/// the local snapshot (folded into each RunReport) and in the `metrics`
/// macro recorder for whatever exporter the process wires up.
#[derive(Default)]
pub struct MetricsSink {
    counters: RwLock<BTreeMap<String, AtomicU64>>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &str, by: u64) {
        ::metrics::counter!(name.to_string()).increment(by);
        {
            let counters = self.counters.read().unwrap();
            if let Some(counter) = counters.get(name) {
                counter.fetch_add(by, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().unwrap();
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::Relaxed);
    }

    pub fn observe_ms(&self, name: &str, ms: u64) {
        ::metrics::histogram!(name.to_string()).record(ms as f64);
        self.incr(&format!("{name}_total_ms"), ms);
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// The only alert path besides config failures: surfaced loudly and
    /// counted so dashboards can page on the rate.
    pub fn alert(&self, name: &str, message: &str) {
        error!(alert = name, "{message}");
        self.incr(&format!("alert_{name}"), 1);
    }
}
