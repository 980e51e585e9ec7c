//! Disruptor Main Class Implementation
//!
//! `Disruptor` wires a ring buffer to its consumers. Handlers are added as
//! independent consumers with `handle_events_with`, or behind other consumers
//! with `handle_events_after`. The producer always gates on the consumers at
//! the end of each chain.
//!
//! Lifecycle: wire handlers, `start` once, publish, then `shutdown` to drain
//! and stop or `halt` to stop immediately.

use crate::disruptor::consumer_repository::ConsumerRepository;
use crate::disruptor::{
    util, BatchEventProcessor, DisruptorConfig, DisruptorError, EventFactory, EventHandler,
    EventProcessor, EventTranslator, ExceptionHandler, ExceptionHandlerWrapper, ManagedThread,
    Producer, Result, RingBuffer, Sequence, SequenceBarrier, ThreadContext, WaitStrategy,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The main Disruptor class
///
/// # Type Parameters
/// * `T` - The event type stored in the ring buffer
///
/// # Examples
/// ```
/// use seqring::disruptor::{
///     BlockingWaitStrategy, ClosureEventHandler, DefaultEventFactory, Disruptor,
/// };
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Order {
///     id: i64,
/// }
///
/// let mut disruptor = Disruptor::new(
///     DefaultEventFactory::<Order>::new(),
///     1024,
///     Arc::new(BlockingWaitStrategy::new()),
/// )
/// .unwrap();
///
/// disruptor
///     .handle_events_with(ClosureEventHandler::new(|order: &Order, _seq, _eob| {
///         assert!(order.id >= 0);
///         Ok(())
///     }))
///     .unwrap();
///
/// disruptor.start().unwrap();
/// disruptor
///     .publish_event(|order: &mut Order, seq: i64| order.id = seq)
///     .unwrap();
/// disruptor.shutdown(None).unwrap();
/// ```
pub struct Disruptor<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    producer: Producer<T>,
    consumer_repository: ConsumerRepository,
    /// Handler given to processors created from now on
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    default_exception_handler: Arc<ExceptionHandlerWrapper<T>>,
    custom_exception_handler_set: bool,
    thread_context: ThreadContext,
    threads: Vec<ManagedThread>,
    started: bool,
}

/// A set of consumers that later handlers can be chained behind
#[derive(Debug, Clone)]
pub struct EventHandlerGroup {
    sequences: Vec<Arc<Sequence>>,
}

impl EventHandlerGroup {
    /// Combine with another group, e.g. to make a handler wait for both
    pub fn and(&self, other: &EventHandlerGroup) -> EventHandlerGroup {
        let mut sequences = self.sequences.clone();
        sequences.extend(other.sequences.iter().cloned());
        EventHandlerGroup { sequences }
    }

    /// Progress sequences of the consumers in this group
    pub fn sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }
}

impl<T> Disruptor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new Disruptor backed by a single-producer ring buffer
    ///
    /// # Errors
    /// `DisruptorError::InvalidBufferSize` if `buffer_size` is not a power of two
    pub fn new<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let ring_buffer =
            RingBuffer::create_single_producer(event_factory, buffer_size, wait_strategy)?;
        Self::with_ring_buffer(ring_buffer, ThreadContext::default())
    }

    /// Create a Disruptor from a validated configuration
    ///
    /// # Errors
    /// Any validation error of the configuration
    pub fn from_config<F>(config: &DisruptorConfig, event_factory: F) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        config.validate()?;

        let mut thread_context = ThreadContext::new(config.thread_name_prefix.clone());
        if config.pin_to_cores {
            thread_context = thread_context.pin_to_all_cores();
        }

        let ring_buffer = RingBuffer::create_single_producer(
            event_factory,
            config.buffer_size,
            config.build_wait_strategy(),
        )?;
        Self::with_ring_buffer(ring_buffer, thread_context)
    }

    fn with_ring_buffer(
        ring_buffer: RingBuffer<T>,
        thread_context: ThreadContext,
    ) -> Result<Self> {
        let ring_buffer = Arc::new(ring_buffer);
        let producer = ring_buffer.producer()?;
        let default_exception_handler = Arc::new(ExceptionHandlerWrapper::new());
        Ok(Self {
            ring_buffer,
            producer,
            consumer_repository: ConsumerRepository::new(),
            exception_handler: default_exception_handler.clone(),
            default_exception_handler,
            custom_exception_handler_set: false,
            thread_context,
            threads: Vec::new(),
            started: false,
        })
    }

    /// Set how processor threads are named and pinned
    pub fn with_thread_context(mut self, thread_context: ThreadContext) -> Self {
        self.thread_context = thread_context;
        self
    }

    /// Add a consumer that processes every published event
    ///
    /// # Errors
    /// `DisruptorError::IllegalState` if the disruptor has already started
    pub fn handle_events_with<H>(&mut self, event_handler: H) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
    {
        self.create_event_processor(&[], event_handler)
    }

    /// Add a consumer that only sees an event after every consumer in
    /// `group` has processed it
    ///
    /// # Errors
    /// `DisruptorError::IllegalState` if the disruptor has already started
    pub fn handle_events_after<H>(
        &mut self,
        group: &EventHandlerGroup,
        event_handler: H,
    ) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
    {
        self.create_event_processor(group.sequences(), event_handler)
    }

    fn create_event_processor<H>(
        &mut self,
        barrier_sequences: &[Arc<Sequence>],
        event_handler: H,
    ) -> Result<EventHandlerGroup>
    where
        H: EventHandler<T> + 'static,
    {
        self.check_not_started()?;

        let barrier: Arc<dyn SequenceBarrier> =
            Arc::new(self.ring_buffer.new_barrier(barrier_sequences.to_vec()));
        let processor = Arc::new(BatchEventProcessor::new(
            Arc::clone(&self.ring_buffer),
            Arc::clone(&barrier),
            event_handler,
        ));
        processor.set_exception_handler(Arc::clone(&self.exception_handler));

        let sequence = Arc::clone(processor.get_sequence());
        self.consumer_repository.add(processor, barrier);

        // The new consumer now bounds the producer in place of its upstream
        self.ring_buffer.add_gating_sequences(&[Arc::clone(&sequence)]);
        for upstream in barrier_sequences {
            self.ring_buffer.remove_gating_sequence(upstream);
        }
        self.consumer_repository.unmark_end_of_chain(barrier_sequences);

        Ok(EventHandlerGroup {
            sequences: vec![sequence],
        })
    }

    /// Use `exception_handler` for every handler added after this call
    pub fn handle_exceptions_with(&mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        self.exception_handler = exception_handler;
        self.custom_exception_handler_set = true;
    }

    /// Replace the default (fatal) exception policy for all handlers that use it
    ///
    /// # Errors
    /// `DisruptorError::IllegalState` after `handle_exceptions_with` or `start`
    pub fn set_default_exception_handler(
        &mut self,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
    ) -> Result<()> {
        self.check_not_started()?;
        if self.custom_exception_handler_set {
            return Err(DisruptorError::IllegalState(
                "set_default_exception_handler can not be used after handle_exceptions_with"
                    .to_string(),
            ));
        }
        self.default_exception_handler.switch_to(exception_handler);
        Ok(())
    }

    /// Start a thread per consumer
    ///
    /// Returns once every consumer is running (or has already exited).
    ///
    /// # Errors
    /// `DisruptorError::IllegalState` if called more than once
    pub fn start(&mut self) -> Result<Arc<RingBuffer<T>>> {
        if self.started {
            return Err(DisruptorError::IllegalState(
                "Disruptor::start must only be called once".to_string(),
            ));
        }
        self.started = true;

        let processors: Vec<Arc<dyn EventProcessor>> =
            self.consumer_repository.processors().cloned().collect();
        for processor in &processors {
            let runner = Arc::clone(processor);
            let thread = self.thread_context.spawn(move || runner.run())?;
            self.threads.push(thread);
        }

        for (processor, thread) in processors.iter().zip(&self.threads) {
            while !processor.is_running() && thread.is_running() {
                thread::yield_now();
            }
        }

        debug!(
            consumers = processors.len(),
            buffer_size = self.ring_buffer.buffer_size(),
            "disruptor started"
        );
        Ok(Arc::clone(&self.ring_buffer))
    }

    /// Stop every consumer without waiting for the backlog
    pub fn halt(&self) {
        for processor in self.consumer_repository.processors() {
            processor.halt();
        }
    }

    /// Wait until every consumer has caught up with the producer, then stop
    /// and join all consumer threads
    ///
    /// # Errors
    /// `DisruptorError::Timeout` if `timeout` passes before the backlog drains
    /// (consumers are left running), or the first error a consumer stopped with
    pub fn shutdown(&mut self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        while self.has_backlog() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(
                        cursor = self.cursor(),
                        "timed out waiting for consumers to drain"
                    );
                    return Err(DisruptorError::Timeout);
                }
            }
            thread::yield_now();
        }

        self.halt();
        self.join_threads()
    }

    fn join_threads(&mut self) -> Result<()> {
        let mut result = Ok(());
        for thread in self.threads.drain(..) {
            let name = thread.thread_name().to_string();
            if let Err(error) = thread.join() {
                debug!(thread = %name, error = %error, "consumer stopped with error");
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    fn has_backlog(&self) -> bool {
        self.consumer_repository
            .has_backlog(self.ring_buffer.cursor(), false)
    }

    /// Claim a slot, populate it and publish it
    pub fn publish_event<E>(&mut self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        self.producer.publish_event(translator)
    }

    /// The producer this disruptor publishes through
    pub fn producer(&mut self) -> &mut Producer<T> {
        &mut self.producer
    }

    pub fn ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring_buffer
    }

    /// The producer cursor
    pub fn cursor(&self) -> i64 {
        self.ring_buffer.cursor()
    }

    pub fn buffer_size(&self) -> usize {
        self.ring_buffer.buffer_size()
    }

    /// Progress of the slowest consumer in `group`
    pub fn sequence_value_for(&self, group: &EventHandlerGroup) -> i64 {
        util::get_minimum_sequence(group.sequences(), i64::MAX)
    }

    /// The barrier the first consumer of `group` waits on
    pub fn barrier_for(&self, group: &EventHandlerGroup) -> Option<Arc<dyn SequenceBarrier>> {
        group
            .sequences()
            .first()
            .and_then(|sequence| self.consumer_repository.barrier_for(sequence))
    }

    fn check_not_started(&self) -> Result<()> {
        if self.started {
            return Err(DisruptorError::IllegalState(
                "all event handlers must be added before calling start".to_string(),
            ));
        }
        Ok(())
    }
}

impl<T> Drop for Disruptor<T> {
    fn drop(&mut self) {
        // Threads join on drop, so they must be told to stop first
        if !self.threads.is_empty() {
            for processor in self.consumer_repository.processors() {
                processor.halt();
            }
        }
    }
}

impl<T> std::fmt::Debug for Disruptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("ring_buffer", &self.ring_buffer)
            .field("consumers", &self.consumer_repository)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
