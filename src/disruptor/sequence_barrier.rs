//! Sequence Barrier Implementation
//!
//! A sequence barrier is what a consumer waits on. It combines the producer
//! cursor, the sequences of any upstream consumers, the wait strategy, and a
//! cooperative alert flag used to stop waiting on shutdown.

use crate::disruptor::{
    DisruptorError, FixedSequenceGroup, Result, Sequence, Sequencer, WaitStrategy,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordination barrier for tracking the producer cursor and upstream consumers
pub trait SequenceBarrier: Send + Sync {
    /// Wait for the given sequence to become available
    ///
    /// # Returns
    /// The highest available sequence, which may be higher than requested, or
    /// lower if a timeout-aware wait strategy gave up early
    ///
    /// # Errors
    /// `DisruptorError::Alert` if the barrier is alerted,
    /// `DisruptorError::Timeout` if the wait strategy timed out
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// Current value of the sequence this barrier gates on
    fn get_cursor(&self) -> i64;

    /// Whether an alert has been raised
    fn is_alerted(&self) -> bool;

    /// Raise the alert and wake any thread parked on this barrier
    fn alert(&self);

    /// Clear the alert so the barrier can be waited on again
    fn clear_alert(&self);

    /// Fail with `DisruptorError::Alert` if an alert has been raised
    fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(DisruptorError::Alert)
        } else {
            Ok(())
        }
    }
}

/// Barrier handed to consumers by the ring buffer
///
/// With no upstream sequences the consumer gates on the producer cursor alone.
/// With upstream sequences it gates on their minimum; upstream consumers can
/// never be ahead of the cursor, so the cursor is implied.
pub struct ProcessingSequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    dependent_sequence: FixedSequenceGroup,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a barrier over `sequencer` that also respects `dependent_sequences`
    pub fn new(sequencer: Arc<dyn Sequencer>, dependent_sequences: Vec<Arc<Sequence>>) -> Self {
        let cursor = sequencer.cursor();
        let dependent_sequence = if dependent_sequences.is_empty() {
            FixedSequenceGroup::new(vec![Arc::clone(&cursor)])
        } else {
            FixedSequenceGroup::new(dependent_sequences)
        };

        Self {
            wait_strategy: sequencer.wait_strategy(),
            sequencer,
            cursor,
            dependent_sequence,
            alerted: AtomicBool::new(false),
        }
    }

    /// The sequences this barrier gates on
    pub fn dependent_sequences(&self) -> &[Arc<Sequence>] {
        self.dependent_sequence.sequences()
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available_sequence = self.wait_strategy.wait_for(
            sequence,
            &self.cursor,
            &self.dependent_sequence,
            self,
        )?;

        if available_sequence < sequence {
            return Ok(available_sequence);
        }

        Ok(self
            .sequencer
            .get_highest_published_sequence(sequence, available_sequence))
    }

    fn get_cursor(&self) -> i64 {
        self.dependent_sequence.get()
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ProcessingSequenceBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSequenceBarrier")
            .field("cursor", &self.cursor)
            .field("dependent_sequence", &self.dependent_sequence)
            .field("alerted", &self.is_alerted())
            .finish()
    }
}
