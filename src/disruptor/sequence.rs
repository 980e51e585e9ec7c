//! Sequence implementation for the Disruptor
//!
//! The Sequence is used to track progress through the ring buffer and coordinate
//! between the producer and its consumers. Every sequence lives in its own
//! cache-line-sized slot so that two cores updating different sequences never
//! contend on the same line.

use crate::disruptor::{util, INITIAL_CURSOR_VALUE};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{fence, AtomicI64, Ordering};
use std::sync::Arc;

/// A padded, atomically updated progress counter
///
/// `CachePadded` both aligns the counter to the start of a cache line and pads
/// it out to the end of that line, so nothing else can share it.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Ordered write
    ///
    /// The value becomes visible to other threads in program order, without a
    /// full fence. Used for per-batch progress updates.
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Fully fenced write
    ///
    /// Used when a new value must be observable before any subsequent load on
    /// this thread, e.g. the producer publishing its cursor before it starts
    /// scanning the gating sequences. The trailing fence keeps later `Acquire`
    /// loads from being satisfied ahead of the store.
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    /// Atomically set the value to `new` if it currently equals `expected`
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Atomically increment by one and return the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Atomically add `increment` and return the new value
    pub fn add_and_get(&self, increment: i64) -> i64 {
        let mut current = self.get();
        loop {
            let new_value = current.wrapping_add(increment);
            match self.value.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return new_value,
                Err(actual) => current = actual,
            }
        }
    }

    /// Atomically add `increment` and return the previous value
    #[inline]
    pub fn get_and_add(&self, increment: i64) -> i64 {
        self.add_and_get(increment).wrapping_sub(increment)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// A read-only view over several sequences that reports their minimum
///
/// Barriers use this as their dependent sequence: a consumer may not run ahead
/// of the slowest member of the group.
#[derive(Debug, Clone)]
pub struct FixedSequenceGroup {
    sequences: Vec<Arc<Sequence>>,
}

impl FixedSequenceGroup {
    /// Create a group over the given sequences
    pub fn new(sequences: Vec<Arc<Sequence>>) -> Self {
        Self { sequences }
    }

    /// Minimum value of the group, `i64::MAX` when empty
    #[inline]
    pub fn get(&self) -> i64 {
        match self.sequences.as_slice() {
            [single] => single.get(),
            sequences => util::get_minimum_sequence(sequences, i64::MAX),
        }
    }

    /// Number of sequences in the group
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Check if the group is empty
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Get all sequences as a slice
    pub fn sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }
}
