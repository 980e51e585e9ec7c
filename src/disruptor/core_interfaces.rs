//! Core Interfaces for the Disruptor Pattern
//!
//! These traits are the seams between the ring buffer, the sequencer and the
//! consumers: cursor access, claim/publish operations and read access to slots.

use crate::disruptor::Result;

/// Provides access to a cursor value
pub trait Cursored {
    /// Get the current cursor value
    fn get_cursor(&self) -> i64;
}

/// Operations related to sequencing items in a ring buffer
pub trait Sequenced {
    /// Get the capacity of the data structure
    fn get_buffer_size(&self) -> usize;

    /// Check if the buffer has capacity for `required_capacity` more sequences
    ///
    /// This is a concurrent method, so the answer should only be taken as an
    /// indication of available capacity.
    fn has_available_capacity(&self, required_capacity: i64) -> bool;

    /// Get the remaining capacity
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence, waiting for capacity if necessary
    fn next(&self) -> Result<i64>;

    /// Claim the next `n` sequences, waiting for capacity if necessary
    ///
    /// Returns the highest claimed sequence. Batch producing looks like:
    ///
    /// ```ignore
    /// let n = 10;
    /// let hi = sequencer.next_n(n)?;
    /// let lo = hi - (n - 1);
    /// for sequence in lo..=hi {
    ///     // fill the slot
    /// }
    /// sequencer.publish_range(lo, hi);
    /// ```
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidArgument` if `n` is below 1 or larger
    /// than the buffer.
    fn next_n(&self, n: i64) -> Result<i64>;

    /// Attempt to claim the next sequence without waiting
    ///
    /// # Errors
    /// Returns `DisruptorError::InsufficientCapacity` when the buffer is full.
    fn try_next(&self) -> Result<i64>;

    /// Attempt to claim the next `n` sequences without waiting
    ///
    /// # Errors
    /// Returns `DisruptorError::InsufficientCapacity` when fewer than `n` slots
    /// are free; the producer position is left unchanged.
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Publish a sequence once its slot has been filled
    fn publish(&self, sequence: i64);

    /// Publish an inclusive range of sequences once all slots have been filled
    fn publish_range(&self, lo: i64, hi: i64);
}

/// Read access to the slot backing a sequence
///
/// Decouples consumers from the concrete ring buffer type.
pub trait DataProvider<T>: Send + Sync {
    /// Get the data item at the specified sequence
    fn get(&self, sequence: i64) -> &T;
}
