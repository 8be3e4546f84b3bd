//! Stock Tracker Service
//!
//! The operations exposed to connected clients: registration, symbol
//! assignment and latest-quote lookup. A transport layer calls these
//! directly.

use std::sync::Arc;

use crate::domain::assignment::{AssignmentError, AssignmentRegistry, LatestQuoteIndex, RegistryStats};
use crate::domain::client::{ClientRecord, HostId};
use crate::domain::identity::{IdError, UniqueIdGenerator};
use crate::domain::symbol::SymbolRecord;
use crate::infrastructure::metrics::{self, AssignmentOutcome};

/// Client-facing facade over the registry, the quote index and the id
/// generator.
#[derive(Debug, Clone)]
pub struct StockTrackerService {
    registry: Arc<AssignmentRegistry>,
    index: Arc<LatestQuoteIndex>,
    ids: Arc<UniqueIdGenerator>,
}

impl StockTrackerService {
    /// Create the service.
    #[must_use]
    pub const fn new(
        registry: Arc<AssignmentRegistry>,
        index: Arc<LatestQuoteIndex>,
        ids: Arc<UniqueIdGenerator>,
    ) -> Self {
        Self {
            registry,
            index,
            ids,
        }
    }

    /// Upsert a client record.
    pub fn register_client(&self, client: ClientRecord) {
        self.registry.register_client(client);
    }

    /// Admit a new client under a freshly generated host id.
    ///
    /// # Errors
    ///
    /// Propagates [`IdError::ClockRegression`], which callers should treat
    /// as fatal.
    pub fn admit_client(
        &self,
        host_name: impl Into<String>,
        client_ip: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Result<ClientRecord, IdError> {
        let host_id = self.ids.next_id()?;
        let client = ClientRecord::new(host_id, host_name, client_ip, client_version);
        self.registry.register_client(client.clone());
        Ok(client)
    }

    /// The host's symbol, assigning one on the first call.
    ///
    /// # Errors
    ///
    /// [`AssignmentError::NoSymbolsAvailable`] when the pool is drained.
    pub fn assign_symbol(&self, host_id: HostId) -> Result<Arc<SymbolRecord>, AssignmentError> {
        let existing = self.registry.assignment(host_id).is_some();
        let result = self.registry.assign_symbol(host_id);

        let outcome = match (&result, existing) {
            (Err(_), _) => AssignmentOutcome::Exhausted,
            (Ok(_), true) => AssignmentOutcome::Existing,
            (Ok(_), false) => AssignmentOutcome::Assigned,
        };
        metrics::record_assignment(outcome);
        if outcome == AssignmentOutcome::Assigned {
            metrics::set_pool_size(self.registry.pool().len());
        }

        result
    }

    /// Latest published record for `symbol`.
    #[must_use]
    pub fn get_latest_quote(&self, symbol: &str) -> Option<Arc<SymbolRecord>> {
        self.index.get(symbol)
    }

    /// All published records.
    #[must_use]
    pub fn latest_quotes(&self) -> Vec<Arc<SymbolRecord>> {
        self.index.snapshot()
    }

    /// Tear down a client session, returning its symbol to the pool.
    pub fn release_client(&self, host_id: HostId) -> Option<Arc<SymbolRecord>> {
        let freed = self.registry.release(host_id);
        if freed.is_some() {
            metrics::set_pool_size(self.registry.pool().len());
        }
        freed
    }

    /// Registry counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::assignment::UnassignedPool;
    use crate::domain::identity::decode_id;

    fn service(symbols: &[&str]) -> StockTrackerService {
        let pool = Arc::new(UnassignedPool::new());
        let index = Arc::new(LatestQuoteIndex::new());
        for symbol in symbols {
            let record =
                Arc::new(SymbolRecord::new(symbol, *symbol, Decimal::TEN, Utc::now(), 5.0).unwrap());
            index.publish(Arc::clone(&record));
            pool.push(record);
        }
        StockTrackerService::new(
            Arc::new(AssignmentRegistry::new(pool)),
            index,
            Arc::new(UniqueIdGenerator::new(5).unwrap()),
        )
    }

    #[test]
    fn admitted_clients_get_unique_stamped_ids() {
        let service = service(&[]);
        let a = service.admit_client("alpha", "10.0.0.1", "2.1.0").unwrap();
        let b = service.admit_client("beta", "10.0.0.2", "2.1.0").unwrap();

        assert!(b.host_id > a.host_id);
        assert_eq!(decode_id(a.host_id).machine_id, 5);
        assert_eq!(service.stats().clients, 2);
    }

    #[test]
    fn admit_then_assign_flow() {
        let service = service(&["AAPL"]);
        let client = service.admit_client("alpha", "10.0.0.1", "2.1.0").unwrap();

        let first = service.assign_symbol(client.host_id).unwrap();
        let second = service.assign_symbol(client.host_id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(matches!(
            service.assign_symbol(client.host_id + 1),
            Err(AssignmentError::NoSymbolsAvailable { .. })
        ));
    }

    #[test]
    fn latest_quote_lookup_is_independent_of_assignment() {
        let service = service(&["AAPL", "MSFT"]);
        service.assign_symbol(1).unwrap();

        assert_eq!(service.get_latest_quote("msft").unwrap().last_price, Decimal::TEN);
        assert!(service.get_latest_quote("AAPL").is_some());
        assert!(service.get_latest_quote("NOPE").is_none());
        assert_eq!(service.latest_quotes().len(), 2);
    }

    #[test]
    fn release_returns_symbol_to_pool() {
        let service = service(&["AAPL"]);
        service.assign_symbol(1).unwrap();
        assert_eq!(service.release_client(1).unwrap().symbol, "AAPL");
        assert_eq!(service.assign_symbol(2).unwrap().symbol, "AAPL");
    }
}
