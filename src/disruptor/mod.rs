//! SeqRing Disruptor Implementation
//!
//! This module provides the single-producer messaging core: sequences, the
//! sequencer, the ring buffer, sequence barriers, wait strategies and the
//! batch event processor, plus a thin wiring layer on top of them.

pub mod config;
pub mod consumer_repository;
pub mod core_interfaces;
#[allow(clippy::module_inception)]
pub mod disruptor;
pub mod event_factory;
pub mod event_handler;
pub mod event_processor;
pub mod event_translator;
pub mod exception_handler;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod thread_management;
pub mod util;
pub mod wait_strategy;

#[cfg(test)]
mod property_tests;

pub use config::{DisruptorConfig, WaitStrategyConfig};
pub use core_interfaces::{Cursored, DataProvider, Sequenced};
pub use disruptor::{Disruptor, EventHandlerGroup};
pub use event_factory::{ClosureEventFactory, DefaultEventFactory, EventFactory};
pub use event_handler::{ClosureEventHandler, EventHandler};
pub use event_processor::{BatchEventProcessor, EventProcessor, ProcessorState};
pub use event_translator::{EventTranslator, EventTranslatorOneArg, EventTranslatorTwoArg};
pub use exception_handler::{
    ExceptionHandler, ExceptionHandlerWrapper, FatalExceptionHandler, IgnoreExceptionHandler,
};
pub use ring_buffer::{Producer, RingBuffer};
pub use sequence::{FixedSequenceGroup, Sequence};
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{Sequencer, SingleProducerSequencer};
pub use thread_management::{ManagedThread, ThreadContext};
pub use util::{get_minimum_sequence, get_sequences_for, is_power_of_two, log2};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};

/// The initial cursor value for sequences
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors that can occur in the Disruptor
///
/// `Alert`, `Timeout` and `InsufficientCapacity` are control signals raised on
/// the hot path. They carry no payload so producing one never allocates.
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    #[error("Sequence barrier has been alerted")]
    Alert,

    #[error("Timeout waiting for sequence")]
    Timeout,

    #[error("Insufficient capacity in ring buffer")]
    InsufficientCapacity,

    #[error("Buffer size must be a power of 2 and at least 1, got: {0}")]
    InvalidBufferSize(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Fatal exception processing sequence {sequence}: {message}")]
    Fatal { sequence: i64, message: String },
}

pub type Result<T> = std::result::Result<T, DisruptorError>;
