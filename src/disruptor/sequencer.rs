//! Sequencer Implementation
//!
//! The sequencer hands out sequence numbers to the producer and guarantees it
//! never laps the slowest gating consumer. Only the single-producer variant
//! exists; publication is therefore always contiguous.

use crate::disruptor::{
    util, Cursored, DisruptorError, Result, Sequence, Sequenced, WaitStrategy,
    INITIAL_CURSOR_VALUE,
};
use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Coordinates claiming and publishing of slots in the ring buffer
///
/// Gating sequences must only be added or removed while no consumer is
/// running; the sequencer reads them concurrently with consumer progress.
pub trait Sequencer: Cursored + Sequenced + Send + Sync + std::fmt::Debug {
    /// The producer cursor (highest published sequence)
    fn cursor(&self) -> Arc<Sequence>;

    /// The wait strategy consumers of this sequencer block on
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Force the producer's claim position to `sequence`
    ///
    /// Only for resetting or replaying; not part of the normal claim flow.
    fn claim(&self, sequence: i64);

    /// Whether `sequence` has been published
    fn is_available(&self, sequence: i64) -> bool;

    /// Add sequences the producer must not overtake
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Remove a gating sequence, returning whether it was present
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum of the gating sequences, or the cursor when there are none
    fn minimum_sequence(&self) -> i64;

    /// Highest sequence in `lower_bound..=available_sequence` that is safe to read
    ///
    /// Publication by a single producer is contiguous, so this is simply
    /// `available_sequence`.
    fn get_highest_published_sequence(&self, lower_bound: i64, available_sequence: i64) -> i64;
}

/// Producer-local claim state
///
/// Written only by the producer thread; kept on its own cache line so consumer
/// reads of the cursor never bounce it.
#[derive(Debug)]
struct ClaimState {
    /// Last sequence handed out to the producer
    next_value: AtomicI64,
    /// Snapshot of the slowest gating sequence
    cached_value: AtomicI64,
}

/// Sequencer for a single publishing thread
///
/// `next`/`try_next`/`publish` must only be called from one thread at a time.
/// Inside a `RingBuffer` that is enforced by routing them through its one
/// `Producer`.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating_sequences: RwLock<Vec<Arc<Sequence>>>,
    claim_state: CachePadded<ClaimState>,
}

impl SingleProducerSequencer {
    /// Create a new single producer sequencer
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` unless `buffer_size` is a
    /// power of two.
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if !util::is_power_of_two(buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(buffer_size));
        }

        Ok(Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::new(INITIAL_CURSOR_VALUE)),
            gating_sequences: RwLock::new(Vec::new()),
            claim_state: CachePadded::new(ClaimState {
                next_value: AtomicI64::new(INITIAL_CURSOR_VALUE),
                cached_value: AtomicI64::new(INITIAL_CURSOR_VALUE),
            }),
        })
    }

    fn check_batch_size(&self, n: i64) -> Result<()> {
        if n < 1 {
            return Err(DisruptorError::InvalidArgument(format!(
                "n must be > 0, got {n}"
            )));
        }
        if n > self.buffer_size as i64 {
            return Err(DisruptorError::InvalidArgument(format!(
                "n must be <= buffer size {}, got {n}",
                self.buffer_size
            )));
        }
        Ok(())
    }

    fn gating_minimum(&self, default: i64) -> i64 {
        let sequences = self.gating_sequences.read();
        util::get_minimum_sequence(&sequences, default)
    }

    fn has_capacity(&self, required_capacity: i64, publish_cursor: bool) -> bool {
        let next_value = self.claim_state.next_value.load(Ordering::Relaxed);
        let wrap_point = (next_value + required_capacity) - self.buffer_size as i64;
        let cached_gating_sequence = self.claim_state.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            if publish_cursor {
                self.cursor.set_volatile(next_value);
            }

            let min_sequence = self.gating_minimum(next_value);
            self.claim_state
                .cached_value
                .store(min_sequence, Ordering::Relaxed);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Cursored for SingleProducerSequencer {
    fn get_cursor(&self) -> i64 {
        self.cursor.get()
    }
}

impl Sequenced for SingleProducerSequencer {
    fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.has_capacity(required_capacity, false)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.claim_state.next_value.load(Ordering::Relaxed);
        let consumed = self.gating_minimum(next_value);
        self.buffer_size as i64 - (next_value - consumed)
    }

    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        self.check_batch_size(n)?;

        let next_value = self.claim_state.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating_sequence = self.claim_state.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            // Let consumers see everything claimed so far before we wait on them.
            self.cursor.set_volatile(next_value);

            let mut min_sequence = self.gating_minimum(next_value);
            if wrap_point > min_sequence {
                tracing::trace!(
                    wrap_point,
                    min_sequence,
                    "producer waiting for gating sequences"
                );
                while wrap_point > min_sequence {
                    std::thread::park_timeout(Duration::from_nanos(1));
                    min_sequence = self.gating_minimum(next_value);
                }
            }

            self.claim_state
                .cached_value
                .store(min_sequence, Ordering::Relaxed);
        }

        self.claim_state
            .next_value
            .store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        self.check_batch_size(n)?;

        if !self.has_capacity(n, true) {
            return Err(DisruptorError::InsufficientCapacity);
        }

        let next_sequence = self.claim_state.next_value.load(Ordering::Relaxed) + n;
        self.claim_state
            .next_value
            .store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set_volatile(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _lo: i64, hi: i64) {
        self.publish(hi);
    }
}

impl Sequencer for SingleProducerSequencer {
    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    fn claim(&self, sequence: i64) {
        self.claim_state
            .next_value
            .store(sequence, Ordering::Relaxed);
    }

    fn is_available(&self, sequence: i64) -> bool {
        sequence <= self.cursor.get()
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        // New consumers start from the current cursor so they never see stale slots.
        let cursor = self.cursor.get();
        for sequence in gating_sequences {
            sequence.set(cursor);
        }
        self.gating_sequences
            .write()
            .extend_from_slice(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        let mut sequences = self.gating_sequences.write();
        let before = sequences.len();
        sequences.retain(|s| !Arc::ptr_eq(s, sequence));
        sequences.len() != before
    }

    fn minimum_sequence(&self) -> i64 {
        self.gating_minimum(self.cursor.get())
    }

    fn get_highest_published_sequence(&self, _lower_bound: i64, available_sequence: i64) -> i64 {
        available_sequence
    }
}
