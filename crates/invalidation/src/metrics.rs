use serde::{Deserialize, Serialize};

/// Snapshot published on the metrics `watch` channel after every state change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvalidationMetrics {
    /// Change events received, duplicates included
    pub changes_processed: u64,
    pub batches_processed: u64,
    /// Events that landed in an already armed window
    pub debounce_window_hits: u64,
    pub average_batch_ms: f64,
    /// Distinct paths waiting in the current window
    pub queue_depth: usize,
    pub preemptive_queue_depth: usize,
    pub preemptive_warmups: u64,
    pub preemptive_hits: u64,
    pub preemptive_hit_rate: f64,
    pub contexts_invalidated: u64,
    pub full_invalidations: u64,
    pub deferred_changes: u64,
    pub current_debounce_ms: u64,
    /// Name of the active invalidator
    pub invalidator: String,
}

impl InvalidationMetrics {
    pub(crate) fn record_batch(&mut self, raw_events: usize, elapsed_ms: f64) {
        self.changes_processed += raw_events as u64;
        self.batches_processed += 1;
        let n = self.batches_processed as f64;
        self.average_batch_ms += (elapsed_ms - self.average_batch_ms) / n;
    }

    pub(crate) fn record_preemptive_hits(&mut self, hits: u64) {
        self.preemptive_hits = hits;
        self.preemptive_hit_rate = if self.preemptive_warmups == 0 {
            0.0
        } else {
            (hits as f64 / self.preemptive_warmups as f64).min(1.0)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_average_is_running_mean() {
        let mut metrics = InvalidationMetrics::default();
        metrics.record_batch(3, 10.0);
        metrics.record_batch(1, 20.0);
        assert_eq!(metrics.changes_processed, 4);
        assert_eq!(metrics.batches_processed, 2);
        assert!((metrics.average_batch_ms - 15.0).abs() < 1e-9);
    }

    #[test]
    fn hit_rate_is_bounded() {
        let mut metrics = InvalidationMetrics::default();
        metrics.record_preemptive_hits(5);
        assert_eq!(metrics.preemptive_hit_rate, 0.0);
        metrics.preemptive_warmups = 2;
        metrics.record_preemptive_hits(5);
        assert_eq!(metrics.preemptive_hit_rate, 1.0);
        metrics.record_preemptive_hits(1);
        assert_eq!(metrics.preemptive_hit_rate, 0.5);
    }
}
