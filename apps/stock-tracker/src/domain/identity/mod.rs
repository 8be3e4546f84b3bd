//! Unique Id Generation
//!
//! Snowflake-style 64-bit identifiers:
//!
//! ```text
//! | 41 bits: ms since 2020-01-01Z | 10 bits: machine id | 12 bits: sequence |
//! ```
//!
//! Ids are strictly increasing for a single generator. Up to 4096 ids are
//! issued per millisecond; beyond that the caller spins until the next
//! millisecond. A clock that moves backwards is refused outright.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Bits reserved for the machine id.
pub const MACHINE_ID_BITS: u32 = 10;

/// Bits reserved for the per-millisecond sequence.
pub const SEQUENCE_BITS: u32 = 12;

/// Largest accepted machine id (1023).
pub const MAX_MACHINE_ID: i64 = (1 << MACHINE_ID_BITS) - 1;

const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_SHIFT: u32 = MACHINE_ID_BITS + SEQUENCE_BITS;

/// Milliseconds from the Unix epoch to 2020-01-01T00:00:00Z.
const CUSTOM_EPOCH_MS: i64 = 1_577_836_800_000;

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Id generation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Machine id outside `0..=1023`.
    #[error("machine id {0} out of range 0..={MAX_MACHINE_ID}")]
    InvalidMachineId(i64),

    /// Wall clock observed moving backwards.
    #[error("clock moved backwards: last={last_ms}ms now={now_ms}ms, refusing to generate id")]
    ClockRegression {
        /// Last timestamp used (ms since custom epoch).
        last_ms: i64,
        /// Observed timestamp (ms since custom epoch).
        now_ms: i64,
    },
}

#[derive(Debug)]
struct GeneratorState {
    last_timestamp: i64,
    sequence: i64,
}

/// Thread-safe snowflake id generator.
pub struct UniqueIdGenerator {
    machine_id: i64,
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl std::fmt::Debug for UniqueIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueIdGenerator")
            .field("machine_id", &self.machine_id)
            .finish_non_exhaustive()
    }
}

impl UniqueIdGenerator {
    /// Create a generator on the system clock.
    pub fn new(machine_id: i64) -> Result<Self, IdError> {
        Self::with_clock(machine_id, Arc::new(SystemClock))
    }

    /// Create a generator on a custom clock.
    pub fn with_clock(machine_id: i64, clock: Arc<dyn Clock>) -> Result<Self, IdError> {
        if !(0..=MAX_MACHINE_ID).contains(&machine_id) {
            return Err(IdError::InvalidMachineId(machine_id));
        }
        Ok(Self {
            machine_id,
            clock,
            state: Mutex::new(GeneratorState {
                last_timestamp: -1,
                sequence: 0,
            }),
        })
    }

    /// Machine id baked into every generated id.
    #[must_use]
    pub const fn machine_id(&self) -> i64 {
        self.machine_id
    }

    /// Produce the next id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::ClockRegression`] if the clock reads earlier than
    /// the last issued timestamp. This is fatal for the generator's caller.
    pub fn next_id(&self) -> Result<i64, IdError> {
        let mut state = self.state.lock();
        let mut timestamp = self.current_timestamp();

        if timestamp < state.last_timestamp {
            return Err(IdError::ClockRegression {
                last_ms: state.last_timestamp,
                now_ms: timestamp,
            });
        }

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                timestamp = self.wait_next_millis(state.last_timestamp)?;
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = timestamp;

        Ok((timestamp << TIMESTAMP_SHIFT) | (self.machine_id << SEQUENCE_BITS) | state.sequence)
    }

    fn current_timestamp(&self) -> i64 {
        self.clock.now_millis() - CUSTOM_EPOCH_MS
    }

    fn wait_next_millis(&self, last_timestamp: i64) -> Result<i64, IdError> {
        loop {
            let timestamp = self.current_timestamp();
            if timestamp > last_timestamp {
                return Ok(timestamp);
            }
            if timestamp < last_timestamp {
                return Err(IdError::ClockRegression {
                    last_ms: last_timestamp,
                    now_ms: timestamp,
                });
            }
            std::hint::spin_loop();
        }
    }
}

/// Decoded parts of a generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Wall-clock time the id was issued.
    pub issued_at: DateTime<Utc>,
    /// Machine id field.
    pub machine_id: i64,
    /// Sequence field.
    pub sequence: i64,
}

/// Split an id back into its fields.
#[must_use]
pub fn decode_id(id: i64) -> IdParts {
    let millis = (id >> TIMESTAMP_SHIFT) + CUSTOM_EPOCH_MS;
    IdParts {
        issued_at: Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH),
        machine_id: (id >> SEQUENCE_BITS) & MAX_MACHINE_ID,
        sequence: id & MAX_SEQUENCE,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    /// Clock pinned to a settable instant.
    struct ManualClock(AtomicI64);

    impl Clock for ManualClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Clock replaying a script of readings, then holding the last one.
    struct ScriptedClock(Mutex<VecDeque<i64>>);

    impl Clock for ScriptedClock {
        fn now_millis(&self) -> i64 {
            let mut readings = self.0.lock();
            if readings.len() > 1 {
                readings.pop_front().unwrap_or_default()
            } else {
                readings.front().copied().unwrap_or_default()
            }
        }
    }

    const T0: i64 = CUSTOM_EPOCH_MS + 1_000;

    #[test]
    fn rejects_out_of_range_machine_id() {
        assert_eq!(
            UniqueIdGenerator::new(1024).unwrap_err(),
            IdError::InvalidMachineId(1024)
        );
        assert!(UniqueIdGenerator::new(-1).is_err());
        assert!(UniqueIdGenerator::new(MAX_MACHINE_ID).is_ok());
    }

    #[test]
    fn layout_packs_timestamp_machine_and_sequence() {
        let clock = Arc::new(ManualClock(AtomicI64::new(T0)));
        let generator = UniqueIdGenerator::with_clock(7, clock).unwrap();

        let first = generator.next_id().unwrap();
        let second = generator.next_id().unwrap();

        assert_eq!(first, (1_000 << 22) | (7 << 12));
        assert_eq!(second, first + 1);

        let parts = decode_id(second);
        assert_eq!(parts.machine_id, 7);
        assert_eq!(parts.sequence, 1);
        assert_eq!(parts.issued_at.timestamp_millis(), T0);
    }

    #[test]
    fn sequence_resets_on_new_millisecond() {
        let clock = Arc::new(ManualClock(AtomicI64::new(T0)));
        let generator = UniqueIdGenerator::with_clock(1, Arc::clone(&clock) as Arc<dyn Clock>).unwrap();

        generator.next_id().unwrap();
        generator.next_id().unwrap();
        clock.0.store(T0 + 1, Ordering::SeqCst);
        let id = generator.next_id().unwrap();

        assert_eq!(decode_id(id).sequence, 0);
    }

    #[test]
    fn clock_regression_is_refused() {
        let clock = Arc::new(ManualClock(AtomicI64::new(T0)));
        let generator = UniqueIdGenerator::with_clock(1, Arc::clone(&clock) as Arc<dyn Clock>).unwrap();

        generator.next_id().unwrap();
        clock.0.store(T0 - 5, Ordering::SeqCst);

        assert_eq!(
            generator.next_id().unwrap_err(),
            IdError::ClockRegression {
                last_ms: 1_000,
                now_ms: 995,
            }
        );
    }

    #[test]
    fn exhausted_sequence_waits_for_next_millisecond() {
        // 4096 reads at T0 fill the sequence, the overflow call then spins
        // through two more T0 readings before the clock ticks.
        let mut script: VecDeque<i64> = std::iter::repeat_n(T0, 4096 + 3).collect();
        script.push_back(T0 + 1);
        let clock = Arc::new(ScriptedClock(Mutex::new(script)));
        let generator = UniqueIdGenerator::with_clock(3, clock).unwrap();

        let ids: Vec<i64> = (0..4097).map(|_| generator.next_id().unwrap()).collect();

        let last = decode_id(ids[4096]);
        assert_eq!(last.sequence, 0);
        assert_eq!(last.issued_at.timestamp_millis(), T0 + 1);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn concurrent_ids_are_unique_and_increasing_per_thread() {
        let generator = Arc::new(UniqueIdGenerator::new(42).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..5_000)
                        .map(|_| generator.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(all.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(all.len(), 40_000);
    }
}
