//! Event Processor implementation for the Disruptor
//!
//! A `BatchEventProcessor` is the consumer-side run loop. It waits on its
//! barrier, hands every newly available event to its `EventHandler`, and
//! publishes its own progress once per batch. Failures from the handler are
//! routed through an `ExceptionHandler`, which decides whether the processor
//! skips the event or stops.

use crate::disruptor::{
    DataProvider, DisruptorError, EventHandler, ExceptionHandler, FatalExceptionHandler, Result,
    Sequence, SequenceBarrier, INITIAL_CURSOR_VALUE,
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Trait for event processors
///
/// A processor is shared between the thread that runs it and the code that
/// halts it, so every method takes `&self`.
pub trait EventProcessor: Send + Sync {
    /// Get the sequence being tracked by this processor
    fn get_sequence(&self) -> &Arc<Sequence>;

    /// Ask the processor to stop after its current batch
    fn halt(&self);

    /// Check if the processor is running
    fn is_running(&self) -> bool;

    /// Run the processing loop on the calling thread until halted
    ///
    /// # Errors
    /// `DisruptorError::IllegalState` if the processor is already running,
    /// or whatever the exception handler escalated
    fn run(&self) -> Result<()>;
}

/// Lifecycle state of a `BatchEventProcessor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessorState {
    Idle = 0,
    Halted = 1,
    Running = 2,
}

impl ProcessorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessorState::Idle,
            1 => ProcessorState::Halted,
            _ => ProcessorState::Running,
        }
    }
}

/// Batch event processor that delivers events to a single handler
///
/// # Type Parameters
/// * `T` - The event type
/// * `H` - The event handler
pub struct BatchEventProcessor<T, H> {
    state: AtomicU8,
    data_provider: Arc<dyn DataProvider<T>>,
    sequence_barrier: Arc<dyn SequenceBarrier>,
    event_handler: Mutex<H>,
    sequence: Arc<Sequence>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler<T>>>,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    /// Create a new batch event processor
    ///
    /// # Arguments
    /// * `data_provider` - Where events are read from, normally the ring buffer
    /// * `sequence_barrier` - The barrier this processor waits on
    /// * `event_handler` - The handler events are delivered to
    pub fn new<D>(
        data_provider: Arc<D>,
        sequence_barrier: Arc<dyn SequenceBarrier>,
        event_handler: H,
    ) -> Self
    where
        D: DataProvider<T> + 'static,
    {
        Self {
            state: AtomicU8::new(ProcessorState::Idle as u8),
            data_provider: data_provider as Arc<dyn DataProvider<T>>,
            sequence_barrier,
            event_handler: Mutex::new(event_handler),
            sequence: Arc::new(Sequence::new(INITIAL_CURSOR_VALUE)),
            exception_handler: RwLock::new(Arc::new(FatalExceptionHandler)),
        }
    }

    /// Replace the exception handler; failures are fatal until this is called
    pub fn set_exception_handler(&self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        *self.exception_handler.write() = exception_handler;
    }

    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn sequence_barrier(&self) -> &Arc<dyn SequenceBarrier> {
        &self.sequence_barrier
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler<T>> {
        Arc::clone(&self.exception_handler.read())
    }

    fn process_events(&self, handler: &mut H) -> Result<()> {
        let mut next_sequence = self.sequence.get() + 1;

        'processing: loop {
            match self.sequence_barrier.wait_for(next_sequence) {
                Ok(available_sequence) => {
                    if available_sequence < next_sequence {
                        continue;
                    }

                    if let Err(error) =
                        handler.on_batch_start(available_sequence - next_sequence + 1)
                    {
                        self.exception_handler()
                            .handle_event_exception(&error, next_sequence, None)?;
                    }

                    while next_sequence <= available_sequence {
                        let event = self.data_provider.get(next_sequence);
                        let end_of_batch = next_sequence == available_sequence;

                        if let Err(error) = handler.on_event(event, next_sequence, end_of_batch) {
                            self.exception_handler().handle_event_exception(
                                &error,
                                next_sequence,
                                Some(event),
                            )?;
                            // The faulted event counts as consumed
                            self.sequence.set(next_sequence);
                            next_sequence += 1;
                            continue 'processing;
                        }

                        next_sequence += 1;
                    }

                    self.sequence.set(available_sequence);
                }
                Err(DisruptorError::Timeout) => self.notify_timeout(handler)?,
                Err(DisruptorError::Alert) => {
                    if self.state() != ProcessorState::Running {
                        break;
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Ok(())
    }

    fn notify_timeout(&self, handler: &mut H) -> Result<()> {
        let sequence = self.sequence.get();
        match handler.on_timeout(sequence) {
            Ok(()) => Ok(()),
            Err(error) => self
                .exception_handler()
                .handle_event_exception(&error, sequence, None),
        }
    }

    fn notify_start(&self, handler: &mut H) {
        if let Err(error) = handler.on_start() {
            self.exception_handler().handle_on_start_exception(&error);
        }
    }

    fn notify_shutdown(&self, handler: &mut H) {
        if let Err(error) = handler.on_shutdown() {
            self.exception_handler().handle_on_shutdown_exception(&error);
        }
    }

    fn early_exit(&self) {
        let mut handler = self.event_handler.lock();
        self.notify_start(&mut handler);
        self.notify_shutdown(&mut handler);
    }
}

impl<T, H> EventProcessor for BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    fn get_sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    fn halt(&self) {
        debug!(sequence = self.sequence.get(), "halting event processor");
        self.state
            .store(ProcessorState::Halted as u8, Ordering::Release);
        self.sequence_barrier.alert();
    }

    fn is_running(&self) -> bool {
        self.state() == ProcessorState::Running
    }

    fn run(&self) -> Result<()> {
        if let Err(current) = self.state.compare_exchange(
            ProcessorState::Idle as u8,
            ProcessorState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            if ProcessorState::from_u8(current) == ProcessorState::Running {
                return Err(DisruptorError::IllegalState(
                    "event processor is already running".to_string(),
                ));
            }
            // Halted before it ever ran; observers still see start and shutdown
            self.early_exit();
            return Ok(());
        }

        self.sequence_barrier.clear_alert();

        let mut guard = RunGuard {
            processor: self,
            handler: self.event_handler.lock(),
        };
        self.notify_start(&mut guard.handler);
        debug!(sequence = self.sequence.get(), "event processor started");

        let result = if self.is_running() {
            self.process_events(&mut guard.handler)
        } else {
            Ok(())
        };
        drop(guard);

        if let Err(error) = &result {
            debug!(sequence = self.sequence.get(), %error, "event processor failed");
        }
        result
    }
}

/// Notifies shutdown and returns the processor to `Idle` when dropped, so a
/// panicking handler still leaves the processor restartable
struct RunGuard<'a, T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    processor: &'a BatchEventProcessor<T, H>,
    handler: MutexGuard<'a, H>,
}

impl<T, H> Drop for RunGuard<'_, T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    fn drop(&mut self) {
        let processor = self.processor;
        processor.notify_shutdown(&mut self.handler);
        processor
            .state
            .store(ProcessorState::Idle as u8, Ordering::Release);
        debug!(
            sequence = processor.sequence.get(),
            panicking = std::thread::panicking(),
            "event processor stopped"
        );
    }
}

impl<T, H> std::fmt::Debug for BatchEventProcessor<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEventProcessor")
            .field(
                "state",
                &ProcessorState::from_u8(self.state.load(Ordering::Acquire)),
            )
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BlockingWaitStrategy, DefaultEventFactory, IgnoreExceptionHandler, Producer, RingBuffer,
        TimeoutBlockingWaitStrategy, WaitStrategy,
    };
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Debug, Default, Clone)]
    struct TestEvent {
        value: i64,
    }

    #[derive(Debug, Default)]
    struct Journal {
        events: Vec<(i64, i64, bool)>,
        batches: Vec<i64>,
        starts: usize,
        shutdowns: usize,
        timeouts: Vec<i64>,
    }

    struct RecordingHandler {
        journal: Arc<Mutex<Journal>>,
        fail_on: Option<i64>,
    }

    impl EventHandler<TestEvent> for RecordingHandler {
        fn on_event(
            &mut self,
            event: &TestEvent,
            sequence: i64,
            end_of_batch: bool,
        ) -> anyhow::Result<()> {
            if self.fail_on == Some(event.value) {
                anyhow::bail!("cannot handle {}", event.value);
            }
            self.journal
                .lock()
                .events
                .push((event.value, sequence, end_of_batch));
            Ok(())
        }

        fn on_start(&mut self) -> anyhow::Result<()> {
            self.journal.lock().starts += 1;
            Ok(())
        }

        fn on_shutdown(&mut self) -> anyhow::Result<()> {
            self.journal.lock().shutdowns += 1;
            Ok(())
        }

        fn on_batch_start(&mut self, batch_size: i64) -> anyhow::Result<()> {
            self.journal.lock().batches.push(batch_size);
            Ok(())
        }

        fn on_timeout(&mut self, sequence: i64) -> anyhow::Result<()> {
            self.journal.lock().timeouts.push(sequence);
            Ok(())
        }
    }

    struct Fixture {
        producer: Producer<TestEvent>,
        processor: Arc<BatchEventProcessor<TestEvent, RecordingHandler>>,
        journal: Arc<Mutex<Journal>>,
    }

    fn fixture(wait_strategy: Arc<dyn WaitStrategy>, fail_on: Option<i64>) -> Fixture {
        let ring_buffer = Arc::new(
            RingBuffer::create(8, wait_strategy, DefaultEventFactory::<TestEvent>::new()).unwrap(),
        );
        let barrier = Arc::new(ring_buffer.new_barrier(Vec::new()));
        let journal = Arc::new(Mutex::new(Journal::default()));
        let processor = Arc::new(BatchEventProcessor::new(
            ring_buffer.clone(),
            barrier,
            RecordingHandler {
                journal: journal.clone(),
                fail_on,
            },
        ));
        ring_buffer.add_gating_sequences(&[processor.get_sequence().clone()]);
        Fixture {
            producer: ring_buffer.producer().unwrap(),
            processor,
            journal,
        }
    }

    fn publish(producer: &mut Producer<TestEvent>, value: i64) {
        producer
            .publish_event_one_arg(|e: &mut TestEvent, _s: i64, v: i64| e.value = v, value)
            .unwrap();
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn spawn(
        processor: &Arc<BatchEventProcessor<TestEvent, RecordingHandler>>,
    ) -> thread::JoinHandle<Result<()>> {
        let processor = processor.clone();
        thread::spawn(move || processor.run())
    }

    #[test]
    fn test_single_batch_marks_only_last_event() {
        let mut f = fixture(Arc::new(BlockingWaitStrategy::new()), None);
        for value in [10, 11, 12, 13] {
            publish(&mut f.producer, value);
        }

        let handle = spawn(&f.processor);
        wait_until(|| f.processor.get_sequence().get() == 3);
        f.processor.halt();
        handle.join().unwrap().unwrap();

        let journal = f.journal.lock();
        assert_eq!(journal.events, vec![
            (10, 0, false),
            (11, 1, false),
            (12, 2, false),
            (13, 3, true)
        ]);
        assert_eq!(journal.batches, vec![4]);
        assert_eq!((journal.starts, journal.shutdowns), (1, 1));
        assert_eq!(f.processor.state(), ProcessorState::Idle);
    }

    #[test]
    fn test_run_twice_is_illegal() {
        let f = fixture(Arc::new(BlockingWaitStrategy::new()), None);
        let handle = spawn(&f.processor);
        wait_until(|| f.processor.is_running());

        assert!(matches!(
            f.processor.run(),
            Err(DisruptorError::IllegalState(_))
        ));

        f.processor.halt();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_halt_before_run_exits_early() {
        let mut f = fixture(Arc::new(BlockingWaitStrategy::new()), None);
        publish(&mut f.producer, 1);

        f.processor.halt();
        f.processor.run().unwrap();

        let journal = f.journal.lock();
        assert!(journal.events.is_empty());
        assert_eq!((journal.starts, journal.shutdowns), (1, 1));
        assert_eq!(f.processor.state(), ProcessorState::Halted);
        assert_eq!(f.processor.get_sequence().get(), INITIAL_CURSOR_VALUE);
    }

    #[test]
    fn test_halt_releases_blocked_processor_without_regressing() {
        let mut f = fixture(Arc::new(BlockingWaitStrategy::new()), None);
        let handle = spawn(&f.processor);

        publish(&mut f.producer, 1);
        publish(&mut f.producer, 2);
        wait_until(|| f.processor.get_sequence().get() == 1);

        // Now parked waiting for sequence 2
        f.processor.halt();
        handle.join().unwrap().unwrap();

        assert_eq!(f.processor.get_sequence().get(), 1);
        assert_eq!(f.journal.lock().events.len(), 2);
        assert!(!f.processor.is_running());
    }

    #[test]
    fn test_faulted_event_skipped_once_with_ignore_handler() {
        let mut f = fixture(Arc::new(BlockingWaitStrategy::new()), Some(2));
        f.processor
            .set_exception_handler(Arc::new(IgnoreExceptionHandler::new()));
        let handle = spawn(&f.processor);

        for value in 1..=4 {
            publish(&mut f.producer, value);
        }
        wait_until(|| f.processor.get_sequence().get() == 3);
        f.processor.halt();
        handle.join().unwrap().unwrap();

        let values: Vec<i64> = f.journal.lock().events.iter().map(|e| e.0).collect();
        assert_eq!(values, vec![1, 3, 4]);
    }

    #[test]
    fn test_fatal_handler_terminates_processor() {
        let mut f = fixture(Arc::new(BlockingWaitStrategy::new()), Some(2));
        for value in 1..=3 {
            publish(&mut f.producer, value);
        }

        let result = f.processor.run();
        match result {
            Err(DisruptorError::Fatal { sequence, .. }) => assert_eq!(sequence, 1),
            other => panic!("expected fatal error, got {other:?}"),
        }

        let journal = f.journal.lock();
        assert_eq!(journal.events.len(), 1);
        assert_eq!(journal.shutdowns, 1);
        assert_eq!(f.processor.state(), ProcessorState::Idle);
    }

    #[test]
    fn test_timeout_notifies_handler_and_keeps_running() {
        let mut f = fixture(
            Arc::new(TimeoutBlockingWaitStrategy::new(Duration::from_millis(5))),
            None,
        );
        let handle = spawn(&f.processor);

        wait_until(|| f.journal.lock().timeouts.len() >= 2);
        publish(&mut f.producer, 7);
        wait_until(|| f.processor.get_sequence().get() == 0);

        f.processor.halt();
        handle.join().unwrap().unwrap();

        let journal = f.journal.lock();
        assert_eq!(journal.timeouts[0], INITIAL_CURSOR_VALUE);
        assert_eq!(journal.events, vec![(7, 0, true)]);
    }

    #[test]
    fn test_processor_can_rerun_after_halt() {
        let mut f = fixture(Arc::new(BlockingWaitStrategy::new()), None);
        let handle = spawn(&f.processor);
        publish(&mut f.producer, 1);
        wait_until(|| f.processor.get_sequence().get() == 0);
        f.processor.halt();
        handle.join().unwrap().unwrap();

        let handle = spawn(&f.processor);
        publish(&mut f.producer, 2);
        wait_until(|| f.processor.get_sequence().get() == 1);
        f.processor.halt();
        handle.join().unwrap().unwrap();

        assert_eq!(f.journal.lock().starts, 2);
    }

    #[test]
    fn test_lifecycle_errors_are_reported_not_fatal() {
        struct FailingLifecycle {
            reported: Arc<AtomicUsize>,
        }

        impl EventHandler<TestEvent> for FailingLifecycle {
            fn on_event(&mut self, _e: &TestEvent, _s: i64, _b: bool) -> anyhow::Result<()> {
                Ok(())
            }

            fn on_start(&mut self) -> anyhow::Result<()> {
                self.reported.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("start failed")
            }
        }

        let ring_buffer = Arc::new(
            RingBuffer::create(
                4,
                Arc::new(BlockingWaitStrategy::new()),
                DefaultEventFactory::<TestEvent>::new(),
            )
            .unwrap(),
        );
        let reported = Arc::new(AtomicUsize::new(0));
        let processor = Arc::new(BatchEventProcessor::new(
            ring_buffer.clone(),
            Arc::new(ring_buffer.new_barrier(Vec::new())),
            FailingLifecycle {
                reported: reported.clone(),
            },
        ));

        let handle = {
            let processor = processor.clone();
            thread::spawn(move || processor.run())
        };
        wait_until(|| processor.is_running());
        processor.halt();
        handle.join().unwrap().unwrap();
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_still_notifies_shutdown_and_goes_idle() {
        struct PanicsOnEvent {
            journal: Arc<Mutex<Journal>>,
        }

        impl EventHandler<TestEvent> for PanicsOnEvent {
            fn on_event(&mut self, event: &TestEvent, _s: i64, _b: bool) -> anyhow::Result<()> {
                panic!("cannot handle {}", event.value)
            }

            fn on_shutdown(&mut self) -> anyhow::Result<()> {
                self.journal.lock().shutdowns += 1;
                Ok(())
            }
        }

        let ring_buffer = Arc::new(
            RingBuffer::create(
                4,
                Arc::new(BlockingWaitStrategy::new()),
                DefaultEventFactory::<TestEvent>::new(),
            )
            .unwrap(),
        );
        let mut producer = ring_buffer.producer().unwrap();
        let journal = Arc::new(Mutex::new(Journal::default()));
        let processor = Arc::new(BatchEventProcessor::new(
            ring_buffer.clone(),
            Arc::new(ring_buffer.new_barrier(Vec::new())),
            PanicsOnEvent {
                journal: journal.clone(),
            },
        ));
        publish(&mut producer, 9);

        let handle = {
            let processor = processor.clone();
            thread::spawn(move || processor.run())
        };
        assert!(handle.join().is_err());

        assert_eq!(processor.state(), ProcessorState::Idle);
        assert!(!processor.is_running());
        assert_eq!(journal.lock().shutdowns, 1);
        assert_eq!(processor.get_sequence().get(), INITIAL_CURSOR_VALUE);
    }
}
