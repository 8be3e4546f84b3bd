//! Concurrent client admission and assignment.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use stock_tracker::{
    AssignmentError, AssignmentRegistry, LatestQuoteIndex, StockTrackerService, SymbolRecord,
    UnassignedPool, UniqueIdGenerator,
};

const HOSTS: usize = 64;
const SYMBOLS: usize = 40;

fn seeded_tracker(symbols: usize) -> StockTrackerService {
    let pool = Arc::new(UnassignedPool::new());
    let index = Arc::new(LatestQuoteIndex::new());
    for n in 0..symbols {
        let record = Arc::new(
            SymbolRecord::new(&format!("SYM{n:03}"), "Listed", Decimal::ONE, Utc::now(), 1.0)
                .unwrap(),
        );
        index.publish(Arc::clone(&record));
        pool.push(record);
    }

    StockTrackerService::new(
        Arc::new(AssignmentRegistry::new(pool)),
        index,
        Arc::new(UniqueIdGenerator::new(7).unwrap()),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn each_symbol_goes_to_at_most_one_host() {
    let tracker = seeded_tracker(SYMBOLS);

    let mut handles = Vec::with_capacity(HOSTS);
    for n in 0..HOSTS {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            let client = tracker
                .admit_client(format!("host-{n}"), "10.0.0.1", "1.0.0")
                .unwrap();
            (client.host_id, tracker.assign_symbol(client.host_id))
        }));
    }

    let mut assigned = HashSet::new();
    let mut exhausted = 0;
    for handle in handles {
        let (host_id, result) = handle.await.unwrap();
        match result {
            Ok(record) => assert!(assigned.insert(record.symbol.clone())),
            Err(AssignmentError::NoSymbolsAvailable { host_id: failed }) => {
                assert_eq!(failed, host_id);
                exhausted += 1;
            }
        }
    }

    assert_eq!(assigned.len(), SYMBOLS);
    assert_eq!(exhausted, HOSTS - SYMBOLS);

    let stats = tracker.stats();
    assert_eq!(stats.clients, HOSTS);
    assert_eq!(stats.assignments, SYMBOLS);
    assert_eq!(stats.unassigned, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_calls_for_one_host_are_idempotent() {
    let tracker = seeded_tracker(3);
    let host = tracker.admit_client("desk", "10.0.0.2", "1.0.0").unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            tracker.assign_symbol(host.host_id).unwrap().symbol.clone()
        }));
    }

    let mut symbols = HashSet::new();
    for handle in handles {
        symbols.insert(handle.await.unwrap());
    }

    assert_eq!(symbols.len(), 1);
    assert_eq!(tracker.stats().unassigned, 2);
}

#[test]
fn released_symbol_is_reassigned_last() {
    let tracker = seeded_tracker(2);
    let first = tracker.admit_client("a", "10.0.0.3", "1.0.0").unwrap();
    let taken = tracker.assign_symbol(first.host_id).unwrap();

    let freed = tracker.release_client(first.host_id).unwrap();
    assert_eq!(freed.symbol, taken.symbol);

    let second = tracker.admit_client("b", "10.0.0.4", "1.0.0").unwrap();
    let third = tracker.admit_client("c", "10.0.0.5", "1.0.0").unwrap();
    assert_eq!(tracker.assign_symbol(second.host_id).unwrap().symbol, "SYM001");
    assert_eq!(tracker.assign_symbol(third.host_id).unwrap().symbol, taken.symbol);
}

#[test]
fn lookups_do_not_consume_the_pool() {
    let tracker = seeded_tracker(2);

    assert_eq!(tracker.get_latest_quote("sym000").unwrap().symbol, "SYM000");
    assert!(tracker.get_latest_quote("NOPE").is_none());
    assert_eq!(tracker.latest_quotes().len(), 2);
    assert_eq!(tracker.stats().unassigned, 2);
}
