use crate::error::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::time::Duration;

/// Re-runs the per-file analyses of a path during idle time
#[async_trait]
pub trait PreemptiveAnalyzer: Send + Sync {
    /// Stores fresh analyses of `path` with `ttl`; returns how many entries
    /// were written (0 when everything was already cached).
    async fn warm(&self, path: &str, ttl: Duration) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreemptiveCandidate {
    pub path: String,
    pub recently_changed: bool,
    /// `[0, 1]`
    pub centrality: f64,
    seq: u64,
}

impl PreemptiveCandidate {
    /// Recently changed first, then central, then newest
    fn rank(&self, other: &Self) -> Ordering {
        self.recently_changed
            .cmp(&other.recently_changed)
            .then_with(|| self.centrality.total_cmp(&other.centrality))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Bounded, deduplicated warmup queue; the lowest-ranked entry is dropped on overflow
#[derive(Debug)]
pub struct PreemptiveQueue {
    capacity: usize,
    seq: u64,
    items: Vec<PreemptiveCandidate>,
}

impl PreemptiveQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seq: 0,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, path: impl Into<String>, centrality: f64, recently_changed: bool) {
        let path = path.into();
        let centrality = centrality.clamp(0.0, 1.0);
        self.seq += 1;
        let seq = self.seq;
        if let Some(existing) = self.items.iter_mut().find(|c| c.path == path) {
            existing.recently_changed |= recently_changed;
            existing.centrality = existing.centrality.max(centrality);
            existing.seq = seq;
            return;
        }

        self.items.push(PreemptiveCandidate {
            path,
            recently_changed,
            centrality,
            seq,
        });
        if self.items.len() > self.capacity {
            if let Some(worst) = self.position_by(|a, b| b.rank(a)) {
                let dropped = self.items.swap_remove(worst);
                log::debug!("Preemptive queue full, dropped {}", dropped.path);
            }
        }
    }

    pub fn pop(&mut self) -> Option<PreemptiveCandidate> {
        let best = self.position_by(PreemptiveCandidate::rank)?;
        Some(self.items.swap_remove(best))
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|c| c.path != path);
        self.items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position_by(
        &self,
        cmp: impl Fn(&PreemptiveCandidate, &PreemptiveCandidate) -> Ordering,
    ) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| cmp(a, b))
            .map(|(i, _)| i)
    }
}
