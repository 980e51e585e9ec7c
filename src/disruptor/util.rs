//! Small helpers shared by the sequencer, barriers and the wiring layer.

use crate::disruptor::{EventProcessor, Sequence};
use std::sync::Arc;

/// Check whether `n` is a power of two (zero is not)
#[inline]
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Integer base-2 logarithm, rounded down
///
/// # Panics
/// Panics if `n` is zero.
#[inline]
pub fn log2(n: usize) -> u32 {
    assert!(n > 0, "log2 of zero is undefined");
    usize::BITS - 1 - n.leading_zeros()
}

/// Get the minimum value across a set of sequences
///
/// Returns `minimum` when the slice is empty or when every sequence is above it.
pub fn get_minimum_sequence(sequences: &[Arc<Sequence>], minimum: i64) -> i64 {
    sequences
        .iter()
        .map(|sequence| sequence.get())
        .fold(minimum, i64::min)
}

/// Collect the progress sequences of a set of event processors
pub fn get_sequences_for(processors: &[Arc<dyn EventProcessor>]) -> Vec<Arc<Sequence>> {
    processors
        .iter()
        .map(|processor| Arc::clone(processor.get_sequence()))
        .collect()
}
