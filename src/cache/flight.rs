//! Per-key single-flight registry.
//!
//! The first caller to miss on a key opens a flight; everyone else missing
//! on the same key joins it and awaits the same outcome. If the caller
//! driving the fetch is dropped, one of the waiters takes over. A flight is
//! closed once it has an outcome, or once its last handle is dropped.

use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::error::CacheError;
use super::instrumentation::ServedFrom;

#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub payload: Bytes,
    pub served_from: ServedFrom,
}

pub(crate) type FlightOutcome = Result<Resolved, CacheError>;

pub(crate) struct Flight {
    pub id: Uuid,
    pub key: String,
    /// Tags the opening caller asked for; these are what gets written.
    pub tags: BTreeSet<String>,
    superseded: AtomicBool,
    /// Live handles; only changed while the registry shard is locked or on drop.
    handles: AtomicUsize,
    outcome: OnceCell<FlightOutcome>,
}

impl Flight {
    fn new(key: &str, tags: BTreeSet<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.to_string(),
            tags,
            superseded: AtomicBool::new(false),
            handles: AtomicUsize::new(1),
            outcome: OnceCell::new(),
        }
    }

    /// Marks the flight as overtaken by an invalidation. Its payload will
    /// still reach its callers but must not be written to the store.
    pub fn supersede(&self) {
        self.superseded.store(true, Ordering::SeqCst);
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    /// Called by whichever caller starts the fetch. Invalidations seen before
    /// this point predate the fetch and do not block its write.
    pub fn claim(&self) {
        self.superseded.store(false, Ordering::SeqCst);
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.initialized()
    }

    /// Runs `resolve` unless another caller already is, then returns the
    /// shared outcome.
    pub async fn outcome<F, Fut>(&self, resolve: F) -> FlightOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightOutcome>,
    {
        self.outcome.get_or_init(resolve).await.clone()
    }
}

/// A caller's stake in a flight. Dropping it closes the flight when the
/// outcome is known or when no other caller is left waiting on it.
pub(crate) struct FlightHandle<'a> {
    flights: &'a Flights,
    flight: Arc<Flight>,
}

impl Deref for FlightHandle<'_> {
    type Target = Flight;

    fn deref(&self) -> &Flight {
        &self.flight
    }
}

impl Drop for FlightHandle<'_> {
    fn drop(&mut self) {
        self.flight.handles.fetch_sub(1, Ordering::SeqCst);
        self.flights.inflight.remove_if(&self.flight.key, |_, current| {
            Arc::ptr_eq(current, &self.flight)
                && (current.is_resolved() || current.handles.load(Ordering::SeqCst) == 0)
        });
    }
}

#[derive(Default)]
pub(crate) struct Flights {
    inflight: DashMap<String, Arc<Flight>>,
}

impl Flights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle on the key's open flight, opening one if needed. The
    /// flag is true when an existing flight was joined.
    pub fn join(&self, key: &str, tags: &BTreeSet<String>) -> (FlightHandle<'_>, bool) {
        let (flight, joined) = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let flight = Arc::clone(occupied.get());
                flight.handles.fetch_add(1, Ordering::SeqCst);
                (flight, true)
            }
            Entry::Vacant(vacant) => {
                let flight = Arc::new(Flight::new(key, tags.clone()));
                vacant.insert(Arc::clone(&flight));
                (flight, false)
            }
        };
        let handle = FlightHandle {
            flights: self,
            flight,
        };
        (handle, joined)
    }

    pub fn supersede_key(&self, key: &str) -> bool {
        match self.inflight.get(key) {
            Some(flight) => {
                flight.supersede();
                true
            }
            None => false,
        }
    }

    /// Supersedes every flight whose key or tag set is affected.
    pub fn supersede_matching(&self, keys: &BTreeSet<String>, tags: &BTreeSet<String>) -> usize {
        let mut count = 0;
        for flight in self.inflight.iter() {
            if keys.contains(flight.key()) || !flight.tags.is_disjoint(tags) {
                flight.supersede();
                count += 1;
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }
}
