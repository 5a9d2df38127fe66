use crate::config::InvalidationConfig;
use context_protocol::{ChangeEvent, ChangeType};
use std::collections::{BTreeMap, VecDeque};
use tokio::time::{Duration, Instant};

/// Events drained from one debounce window
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// One event per path, ordered by path
    pub events: Vec<ChangeEvent>,
    /// Events received, duplicates included
    pub raw_events: usize,
}

/// Trailing-edge debounce with burst extension.
///
/// Idle until the first event arms it; every further event pushes the
/// deadline to `last + window`, bounded by `first + max_batch`. When more than
/// `rapid_threshold` events land within `rate_window` the window grows by half
/// the base window per event, up to `max_window`.
#[derive(Debug)]
pub struct DebounceState {
    base: Duration,
    max_window: Duration,
    rapid_threshold: usize,
    rate_window: Duration,
    max_batch: Duration,
    window: Duration,
    pending: BTreeMap<String, ChangeEvent>,
    raw_events: usize,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
    recent: VecDeque<Instant>,
}

impl DebounceState {
    pub fn new(config: &InvalidationConfig) -> Self {
        let base = config.debounce;
        Self {
            base,
            max_window: config.max_debounce.max(base),
            rapid_threshold: config.rapid_change_threshold,
            rate_window: config.rate_window,
            max_batch: config.max_batch_wait,
            window: base,
            pending: BTreeMap::new(),
            raw_events: 0,
            first_event: None,
            last_event: None,
            recent: VecDeque::new(),
        }
    }

    /// Adds `event` to the current batch. Returns `true` when the window was
    /// already armed, i.e. the event was coalesced.
    pub fn record(&mut self, event: ChangeEvent, now: Instant) -> bool {
        let armed = self.is_armed();

        self.recent.push_back(now);
        while let Some(front) = self.recent.front() {
            if now.duration_since(*front) > self.rate_window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        if self.recent.len() > self.rapid_threshold {
            let extended = (self.window + self.base / 2).min(self.max_window);
            if extended > self.window {
                log::debug!(
                    "Rapid changes ({} in {:?}), debounce window {:?} -> {:?}",
                    self.recent.len(),
                    self.rate_window,
                    self.window,
                    extended
                );
            }
            self.window = extended;
        }

        self.raw_events += 1;
        self.first_event.get_or_insert(now);
        self.last_event = Some(now);
        self.merge(event);
        armed
    }

    fn merge(&mut self, event: ChangeEvent) {
        match self.pending.get_mut(&event.path) {
            // A file created in this batch is still new to every consumer
            Some(existing)
                if existing.change_type == ChangeType::Add
                    && event.change_type == ChangeType::Modify =>
            {
                existing.timestamp_unix_ms = event.timestamp_unix_ms;
            }
            Some(existing) => *existing = event,
            None => {
                self.pending.insert(event.path.clone(), event);
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.is_armed() {
            return None;
        }
        let mut deadline = self.last_event.map(|last| last + self.window);
        if let Some(first) = self.first_event {
            let forced = first + self.max_batch;
            deadline = Some(match deadline {
                Some(current) if forced < current => forced,
                Some(current) => current,
                None => forced,
            });
        }
        deadline
    }

    /// Drains the batch and disarms. The burst history survives so a
    /// continuing burst re-extends quickly; the window itself restarts at base.
    pub fn take_batch(&mut self) -> Batch {
        let events = std::mem::take(&mut self.pending).into_values().collect();
        let raw_events = std::mem::take(&mut self.raw_events);
        self.first_event = None;
        self.last_event = None;
        self.window = self.base;
        Batch { events, raw_events }
    }
}
