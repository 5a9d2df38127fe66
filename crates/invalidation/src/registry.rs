use context_graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Identity and version handed out when a context is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTicket {
    pub id: ContextId,
    pub version: u64,
}

/// A registration removed by invalidation, with its bumped version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidatedContext {
    pub id: ContextId,
    pub version: u64,
    pub paths: BTreeSet<String>,
}

/// Position in the change log, taken before a context's files are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegistryEpoch(u64);

/// One active registration as seen by an invalidator
#[derive(Debug, Clone)]
pub struct RegisteredContext {
    pub id: ContextId,
    pub paths: BTreeSet<String>,
    /// Graph the context was selected over; `None` defers to the shared one
    pub graph: Option<Arc<DependencyGraph>>,
}

#[derive(Debug)]
struct Registration {
    paths: BTreeSet<String>,
    version: u64,
    graph: Option<Arc<DependencyGraph>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    active: HashMap<ContextId, Registration>,
    change_seq: u64,
    /// Sequence number of the latest processed change per path
    last_change: HashMap<String, u64>,
    last_full_change: u64,
}

impl RegistryState {
    fn changed_since(&self, epoch: RegistryEpoch, path: &str) -> bool {
        self.last_change.get(path).is_some_and(|seq| *seq > epoch.0)
    }
}

/// Which files fed which built contexts. Shared by the request path
/// (registers) and the invalidation loop (invalidates).
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register<I, S>(&self, paths: I) -> ContextTicket
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        let epoch = RegistryEpoch(state.change_seq);
        Self::insert(&mut state, paths.into_iter().map(Into::into).collect(), None, epoch)
    }

    /// Current position in the change log
    pub fn epoch(&self) -> RegistryEpoch {
        RegistryEpoch(self.lock().change_seq)
    }

    /// Registers a context built from files read after `since`, tracked
    /// against the graph it was selected over.
    ///
    /// If a change to any of its files (selected, or merely part of `graph`)
    /// was processed after `since`, the context was built from stale content:
    /// the returned ticket is already superseded.
    pub fn register_built<I, S>(
        &self,
        paths: I,
        graph: Option<Arc<DependencyGraph>>,
        since: RegistryEpoch,
    ) -> ContextTicket
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        let paths: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        Self::insert(&mut state, paths, graph, since)
    }

    fn insert(
        state: &mut RegistryState,
        paths: BTreeSet<String>,
        graph: Option<Arc<DependencyGraph>>,
        since: RegistryEpoch,
    ) -> ContextTicket {
        state.next_id += 1;
        let id = ContextId(state.next_id);
        let ticket = ContextTicket { id, version: 1 };

        let stale = state.last_full_change > since.0
            || paths.iter().any(|p| state.changed_since(since, p))
            || graph.as_ref().is_some_and(|g| {
                g.files().any(|node| state.changed_since(since, &node.path))
            });
        if stale {
            log::debug!("{id} was built from files changed meanwhile; not registered");
            return ticket;
        }

        log::debug!("Registered {id} over {} files", paths.len());
        state.active.insert(
            id,
            Registration {
                paths,
                version: 1,
                graph,
            },
        );
        ticket
    }

    /// Logs a processed change so contexts still being built notice it
    pub fn record_changes<S: AsRef<str>>(&self, paths: &[S]) {
        let mut state = self.lock();
        state.change_seq += 1;
        let seq = state.change_seq;
        for path in paths {
            state.last_change.insert(path.as_ref().to_string(), seq);
        }
    }

    /// Logs a change that invalidates everything
    pub fn record_full_change(&self) {
        let mut state = self.lock();
        state.change_seq += 1;
        state.last_full_change = state.change_seq;
    }

    pub fn discard(&self, id: ContextId) -> bool {
        self.lock().active.remove(&id).is_some()
    }

    /// Still registered and not superseded
    pub fn is_current(&self, ticket: ContextTicket) -> bool {
        self.lock()
            .active
            .get(&ticket.id)
            .is_some_and(|r| r.version == ticket.version)
    }

    pub fn paths_of(&self, id: ContextId) -> Option<BTreeSet<String>> {
        self.lock().active.get(&id).map(|r| r.paths.clone())
    }

    /// Contexts whose file set intersects `paths`, in id order
    pub fn contexts_touching<S: AsRef<str>>(&self, paths: &[S]) -> Vec<ContextId> {
        let state = self.lock();
        let mut ids: Vec<ContextId> = state
            .active
            .iter()
            .filter(|(_, r)| paths.iter().any(|p| r.paths.contains(p.as_ref())))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Active registrations in id order
    pub fn snapshot(&self) -> Vec<RegisteredContext> {
        let state = self.lock();
        let mut contexts: Vec<RegisteredContext> = state
            .active
            .iter()
            .map(|(id, r)| RegisteredContext {
                id: *id,
                paths: r.paths.clone(),
                graph: r.graph.clone(),
            })
            .collect();
        contexts.sort_by_key(|c| c.id);
        contexts
    }

    pub fn active_ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.lock().active.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Removes the given registrations; unknown ids are ignored
    pub fn invalidate(&self, ids: &[ContextId]) -> Vec<InvalidatedContext> {
        let mut state = self.lock();
        ids.iter()
            .filter_map(|id| {
                state.active.remove(id).map(|r| InvalidatedContext {
                    id: *id,
                    version: r.version + 1,
                    paths: r.paths,
                })
            })
            .collect()
    }

    pub fn invalidate_all(&self) -> Vec<InvalidatedContext> {
        let ids = self.active_ids();
        self.invalidate(&ids)
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }
}
