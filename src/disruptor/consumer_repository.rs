//! Consumer bookkeeping for the wiring layer
//!
//! Tracks every processor added to a `Disruptor`, the barrier it waits on,
//! and whether it is at the end of a chain. End-of-chain processors are the
//! ones the producer gates on and the ones a drain waits for.

use crate::disruptor::{EventProcessor, Sequence, SequenceBarrier};
use std::sync::Arc;

struct ConsumerInfo {
    processor: Arc<dyn EventProcessor>,
    barrier: Arc<dyn SequenceBarrier>,
    end_of_chain: bool,
}

/// Registry of the processors wired into a disruptor
#[derive(Default)]
pub struct ConsumerRepository {
    consumers: Vec<ConsumerInfo>,
}

impl ConsumerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor; new processors start at the end of their chain
    pub fn add(&mut self, processor: Arc<dyn EventProcessor>, barrier: Arc<dyn SequenceBarrier>) {
        self.consumers.push(ConsumerInfo {
            processor,
            barrier,
            end_of_chain: true,
        });
    }

    /// Mark the processors owning `sequences` as having downstream consumers
    pub fn unmark_end_of_chain(&mut self, sequences: &[Arc<Sequence>]) {
        for info in &mut self.consumers {
            if sequences
                .iter()
                .any(|s| Arc::ptr_eq(s, info.processor.get_sequence()))
            {
                info.end_of_chain = false;
            }
        }
    }

    /// Sequences of the processors at the end of every chain
    ///
    /// Stopped processors are skipped unless `include_stopped` is set.
    pub fn last_sequences_in_chain(&self, include_stopped: bool) -> Vec<Arc<Sequence>> {
        self.consumers
            .iter()
            .filter(|info| info.end_of_chain && (include_stopped || info.processor.is_running()))
            .map(|info| Arc::clone(info.processor.get_sequence()))
            .collect()
    }

    /// Whether any end-of-chain processor is still behind `cursor`
    pub fn has_backlog(&self, cursor: i64, include_stopped: bool) -> bool {
        self.last_sequences_in_chain(include_stopped)
            .iter()
            .any(|sequence| sequence.get() < cursor)
    }

    /// The barrier of the processor that owns `sequence`
    pub fn barrier_for(&self, sequence: &Arc<Sequence>) -> Option<Arc<dyn SequenceBarrier>> {
        self.consumers
            .iter()
            .find(|info| Arc::ptr_eq(info.processor.get_sequence(), sequence))
            .map(|info| Arc::clone(&info.barrier))
    }

    pub fn processors(&self) -> impl Iterator<Item = &Arc<dyn EventProcessor>> {
        self.consumers.iter().map(|info| &info.processor)
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

impl std::fmt::Debug for ConsumerRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.consumers.iter().map(|info| {
                (info.processor.get_sequence().get(), info.end_of_chain)
            }))
            .finish()
    }
}
