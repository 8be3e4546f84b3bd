//! Symbol Assignment
//!
//! In-process state for handing out enriched symbols to clients:
//!
//! - [`UnassignedPool`]: FIFO of records not yet bound to a client. Every
//!   record is dequeued at most once.
//! - [`LatestQuoteIndex`]: symbol → freshest record, read-only lookups.
//! - [`AssignmentRegistry`]: client table plus the `host_id → record`
//!   binding, at most one binding per host.
//!
//! # Concurrency
//!
//! The check-then-bind sequence of [`AssignmentRegistry::assign_symbol`] runs
//! under the assignments write lock, and the pool pop happens inside it. Two
//! first-time callers therefore never share a record, and concurrent calls
//! for the same host observe the first winner's binding instead of draining
//! a second record. Lookups of existing bindings only take the read lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::domain::client::{ClientRecord, HostId};
use crate::domain::symbol::{SymbolRecord, normalize_symbol};

// =============================================================================
// Errors
// =============================================================================

/// Assignment failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignmentError {
    /// The pool is exhausted. Recoverable: the pool is only refilled
    /// externally, never automatically.
    #[error("no symbols available for host {host_id}")]
    NoSymbolsAvailable {
        /// Host that asked.
        host_id: HostId,
    },
}

// =============================================================================
// Unassigned Pool
// =============================================================================

/// Shared, single-consumption queue of unassigned records.
#[derive(Debug, Default)]
pub struct UnassignedPool {
    queue: Mutex<VecDeque<Arc<SymbolRecord>>>,
}

impl UnassignedPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record at the back.
    pub fn push(&self, record: Arc<SymbolRecord>) {
        self.queue.lock().push_back(record);
    }

    /// Append records at the back, preserving their order.
    pub fn replenish(&self, records: impl IntoIterator<Item = Arc<SymbolRecord>>) {
        self.queue.lock().extend(records);
    }

    /// Atomically take the front record.
    #[must_use]
    pub fn pop(&self) -> Option<Arc<SymbolRecord>> {
        self.queue.lock().pop_front()
    }

    /// Records still waiting for a client.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the pool is drained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

// =============================================================================
// Latest Quote Index
// =============================================================================

/// Symbol → most recently fetched record.
#[derive(Debug, Default)]
pub struct LatestQuoteIndex {
    records: RwLock<HashMap<String, Arc<SymbolRecord>>>,
}

impl LatestQuoteIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a record.
    ///
    /// Replaces the stored record unless the stored one carries a newer
    /// `market_time`. Returns whether the index changed.
    pub fn publish(&self, record: Arc<SymbolRecord>) -> bool {
        let mut records = self.records.write();
        match records.get(&record.symbol) {
            Some(existing) if existing.market_time > record.market_time => false,
            _ => {
                records.insert(record.symbol.clone(), record);
                true
            }
        }
    }

    /// Look up a symbol (case-insensitive).
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Arc<SymbolRecord>> {
        self.records.read().get(&normalize_symbol(symbol)).cloned()
    }

    /// All published records, ordered by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<SymbolRecord>> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        records
    }

    /// Number of indexed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

// =============================================================================
// Assignment Registry
// =============================================================================

/// Point-in-time registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered clients.
    pub clients: usize,
    /// Live host → symbol bindings.
    pub assignments: usize,
    /// Records left in the pool.
    pub unassigned: usize,
}

/// Maps connected clients to exactly one symbol each.
#[derive(Debug)]
pub struct AssignmentRegistry {
    clients: RwLock<HashMap<HostId, ClientRecord>>,
    assignments: RwLock<HashMap<HostId, Arc<SymbolRecord>>>,
    pool: Arc<UnassignedPool>,
}

impl AssignmentRegistry {
    /// Create a registry that draws from `pool`.
    #[must_use]
    pub fn new(pool: Arc<UnassignedPool>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            assignments: RwLock::new(HashMap::new()),
            pool,
        }
    }

    /// The pool this registry consumes.
    #[must_use]
    pub const fn pool(&self) -> &Arc<UnassignedPool> {
        &self.pool
    }

    /// Insert or replace a client record keyed by `host_id`.
    pub fn register_client(&self, client: ClientRecord) {
        let host_id = client.host_id;
        let replaced = self.clients.write().insert(host_id, client).is_some();
        if replaced {
            tracing::debug!(host_id, "Client re-registered");
        } else {
            tracing::info!(host_id, "Client registered");
        }
    }

    /// Registered client, if any.
    #[must_use]
    pub fn client(&self, host_id: HostId) -> Option<ClientRecord> {
        self.clients.read().get(&host_id).cloned()
    }

    /// Existing binding for a host, without assigning.
    #[must_use]
    pub fn assignment(&self, host_id: HostId) -> Option<Arc<SymbolRecord>> {
        self.assignments.read().get(&host_id).cloned()
    }

    /// Return the host's symbol, binding the next pooled record on first call.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::NoSymbolsAvailable`] when the host has no
    /// binding yet and the pool is empty.
    pub fn assign_symbol(&self, host_id: HostId) -> Result<Arc<SymbolRecord>, AssignmentError> {
        if let Some(record) = self.assignments.read().get(&host_id) {
            tracing::debug!(host_id, symbol = %record.symbol, "Symbol already assigned");
            return Ok(Arc::clone(record));
        }

        let mut assignments = self.assignments.write();

        // Another caller for the same host may have bound while we waited.
        if let Some(record) = assignments.get(&host_id) {
            return Ok(Arc::clone(record));
        }

        let Some(record) = self.pool.pop() else {
            tracing::warn!(host_id, "No symbols available for host");
            return Err(AssignmentError::NoSymbolsAvailable { host_id });
        };

        assignments.insert(host_id, Arc::clone(&record));
        tracing::info!(host_id, symbol = %record.symbol, "Symbol assigned");
        Ok(record)
    }

    /// Tear down a client session.
    ///
    /// Drops the client record and its binding; the freed record goes back
    /// to the end of the pool. Returns the freed record.
    pub fn release(&self, host_id: HostId) -> Option<Arc<SymbolRecord>> {
        self.clients.write().remove(&host_id);
        let freed = self.assignments.write().remove(&host_id)?;
        self.pool.push(Arc::clone(&freed));
        tracing::info!(host_id, symbol = %freed.symbol, "Assignment released");
        Some(freed)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            clients: self.clients.read().len(),
            assignments: self.assignments.read().len(),
            unassigned: self.pool.len(),
        }
    }
}
