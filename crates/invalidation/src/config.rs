use std::time::Duration;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DEBOUNCE: Duration = Duration::from_millis(2_000);
pub const DEFAULT_RAPID_CHANGE_THRESHOLD: usize = 10;
pub const DEFAULT_MAX_CONCURRENT_ANALYSIS: usize = 4;

#[derive(Debug, Clone)]
pub struct InvalidationConfig {
    /// Quiet period after the last event before a batch is flushed
    pub debounce: Duration,
    /// Cap for the burst-extended window
    pub max_debounce: Duration,
    /// Events per `rate_window` above which the window grows
    pub rapid_change_threshold: usize,
    pub rate_window: Duration,
    /// A batch is flushed this long after its first event even if events keep coming
    pub max_batch_wait: Duration,
    /// Sub-batch size for medium-impact paths
    pub max_concurrent_analysis: usize,
    /// Graph-backed selective invalidation; `false` invalidates every context
    pub smart_invalidation: bool,
    pub preemptive_analysis: bool,
    pub preemptive_ttl: Duration,
    /// Quiet time before idle warming starts
    pub idle_threshold: Duration,
    pub preemptive_queue_capacity: usize,
    pub event_queue_capacity: usize,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_debounce: DEFAULT_MAX_DEBOUNCE,
            rapid_change_threshold: DEFAULT_RAPID_CHANGE_THRESHOLD,
            rate_window: Duration::from_secs(1),
            max_batch_wait: Duration::from_secs(5),
            max_concurrent_analysis: DEFAULT_MAX_CONCURRENT_ANALYSIS,
            smart_invalidation: true,
            preemptive_analysis: true,
            preemptive_ttl: Duration::from_secs(5 * 60),
            idle_threshold: Duration::from_secs(2),
            preemptive_queue_capacity: 256,
            event_queue_capacity: 1024,
        }
    }
}
