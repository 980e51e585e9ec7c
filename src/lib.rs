//! `SeqRing` - Single-Producer Ring Buffer Messaging
//!
//! An in-process messaging core in the style of the LMAX Disruptor: one
//! producer publishes into a pre-allocated ring of events, and any number of
//! consumers read them in order, each on its own thread, coordinating only
//! through padded atomic sequence counters.
//!
//! ## Features
//!
//! - **Pre-allocated**: every slot is created once and then mutated in place
//! - **Back-pressure**: the producer never laps the slowest gating consumer
//! - **Batching**: consumers drain everything available per wake-up and
//!   publish their progress once per batch
//! - **Pluggable waiting**: busy-spin, yielding, sleeping, blocking, or
//!   blocking with a timeout
//! - **Pipelines**: consumers can be chained so a stage only sees events the
//!   previous stage has finished with
//!
//! ## Quick Start
//!
//! ```rust
//! use seqring::disruptor::{
//!     BlockingWaitStrategy, DefaultEventFactory, Disruptor, EventHandler,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct PriceTick {
//!     price: i64,
//! }
//!
//! struct Printer;
//!
//! impl EventHandler<PriceTick> for Printer {
//!     fn on_event(
//!         &mut self,
//!         event: &PriceTick,
//!         sequence: i64,
//!         end_of_batch: bool,
//!     ) -> anyhow::Result<()> {
//!         println!("{sequence}: {} (end of batch: {end_of_batch})", event.price);
//!         Ok(())
//!     }
//! }
//!
//! let mut disruptor = Disruptor::new(
//!     DefaultEventFactory::<PriceTick>::new(),
//!     1024,
//!     Arc::new(BlockingWaitStrategy::new()),
//! )
//! .unwrap();
//! disruptor.handle_events_with(Printer).unwrap();
//! disruptor.start().unwrap();
//!
//! for price in 0..10 {
//!     disruptor
//!         .publish_event(move |tick: &mut PriceTick, _seq: i64| tick.price = price)
//!         .unwrap();
//! }
//!
//! disruptor.shutdown(None).unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`Sequence`**: padded atomic progress counter
//! - **`SingleProducerSequencer`**: claim, publish and capacity checks against
//!   the gating sequences
//! - **`RingBuffer`** / **`Producer`**: the slot array plus its sequencer, and
//!   the one handle allowed to claim and publish into it
//! - **`SequenceBarrier`** / **`WaitStrategy`**: how a consumer waits
//! - **`BatchEventProcessor`**: the consumer run loop
//! - **`Disruptor`**: wiring, threads and shutdown

pub mod disruptor;

// Re-export the main types for convenience
pub use disruptor::{
    is_power_of_two, BatchEventProcessor, BlockingWaitStrategy, BusySpinWaitStrategy,
    DefaultEventFactory, Disruptor, DisruptorConfig, DisruptorError, EventFactory, EventHandler,
    EventProcessor, EventTranslator, EventTranslatorOneArg, EventTranslatorTwoArg,
    ExceptionHandler, FatalExceptionHandler, IgnoreExceptionHandler, Producer, Result,
    RingBuffer, Sequence, SequenceBarrier, Sequencer, SingleProducerSequencer,
    SleepingWaitStrategy, TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
    INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `SeqRing` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
