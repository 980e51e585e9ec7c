#![allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]

//! End-to-end scenarios for the ring buffer, barrier and batch processor
//!
//! Most of these drive the engine directly, without the `Disruptor` wiring
//! layer, so the claim/publish/consume protocol itself is what is under test.

use parking_lot::Mutex;
use rand::Rng;
use seqring::disruptor::{
    BatchEventProcessor, BlockingWaitStrategy, ClosureEventHandler, DefaultEventFactory,
    Disruptor, DisruptorError, EventHandler, EventProcessor, RingBuffer, Sequence,
    SleepingWaitStrategy, YieldingWaitStrategy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Debug, Default, Clone)]
struct Letter {
    value: char,
}

#[test]
fn test_fresh_consumer_sees_one_batch_of_four() {
    init_tracing();
    let ring_buffer = Arc::new(
        RingBuffer::create(
            4,
            Arc::new(SleepingWaitStrategy::new()),
            DefaultEventFactory::<Letter>::new(),
        )
        .unwrap(),
    );

    let mut producer = ring_buffer.producer().unwrap();
    for letter in ['A', 'B', 'C', 'D'] {
        producer
            .publish_event_one_arg(|e: &mut Letter, _s: i64, v: char| e.value = v, letter)
            .unwrap();
    }
    assert_eq!(ring_buffer.cursor(), 3);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let processor = Arc::new(BatchEventProcessor::new(
        ring_buffer.clone(),
        Arc::new(ring_buffer.new_barrier(Vec::new())),
        ClosureEventHandler::new(move |event: &Letter, sequence, end_of_batch| {
            recorder.lock().push((sequence, event.value, end_of_batch));
            Ok(())
        }),
    ));

    let runner = processor.clone();
    let handle = thread::spawn(move || runner.run());
    wait_until(|| processor.get_sequence().get() == 3);
    processor.halt();
    handle.join().unwrap().unwrap();

    assert_eq!(*seen.lock(), vec![
        (0, 'A', false),
        (1, 'B', false),
        (2, 'C', false),
        (3, 'D', true),
    ]);
}

#[test]
fn test_try_next_two_with_one_free_slot_fails() {
    let ring_buffer = Arc::new(
        RingBuffer::create(
            2,
            Arc::new(BlockingWaitStrategy::new()),
            DefaultEventFactory::<Letter>::new(),
        )
        .unwrap(),
    );
    let producer = ring_buffer.producer().unwrap();
    let consumer = Arc::new(Sequence::default());
    ring_buffer.add_gating_sequences(&[consumer.clone()]);

    let sequence = producer.next().unwrap();
    assert_eq!(sequence, 0);
    producer.publish(sequence);
    assert_eq!(ring_buffer.remaining_capacity(), 1);

    assert!(matches!(
        producer.try_next_n(2),
        Err(DisruptorError::InsufficientCapacity)
    ));
    // Failure is idempotent and the single free slot is still claimable
    assert!(matches!(
        producer.try_next_n(2),
        Err(DisruptorError::InsufficientCapacity)
    ));
    assert_eq!(producer.try_next().unwrap(), 1);
}

#[test]
fn test_producer_blocks_until_slowest_consumer_frees_a_slot() {
    let ring_buffer = Arc::new(
        RingBuffer::create(
            4,
            Arc::new(BlockingWaitStrategy::new()),
            DefaultEventFactory::<Letter>::new(),
        )
        .unwrap(),
    );
    let consumer = Arc::new(Sequence::default());
    ring_buffer.add_gating_sequences(&[consumer.clone()]);

    let producer = ring_buffer.producer().unwrap();
    let hi = producer.next_n(4).unwrap();
    producer.publish(hi);

    // The producer moves to its own thread
    let producing = thread::spawn(move || {
        let sequence = producer.next().unwrap();
        producer.publish(sequence);
        sequence
    });

    thread::sleep(Duration::from_millis(20));
    assert_eq!(ring_buffer.cursor(), 3, "producer must not lap the consumer");

    consumer.set(0);
    assert_eq!(producing.join().unwrap(), 4);
    assert_eq!(ring_buffer.cursor(), 4);
}

#[derive(Debug, Default)]
struct Payload {
    value: i64,
}

struct StageOne {
    processed: Arc<AtomicUsize>,
}

impl EventHandler<Payload> for StageOne {
    fn on_event(
        &mut self,
        _event: &Payload,
        _sequence: i64,
        _end_of_batch: bool,
    ) -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        if rng.gen_range(0..10) == 0 {
            thread::sleep(Duration::from_micros(rng.gen_range(10..200)));
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct StageTwo {
    upstream: Arc<Sequence>,
    ring_buffer: Arc<RingBuffer<Payload>>,
    violations: Arc<AtomicUsize>,
    last: i64,
}

impl EventHandler<Payload> for StageTwo {
    fn on_event(
        &mut self,
        event: &Payload,
        sequence: i64,
        _end_of_batch: bool,
    ) -> anyhow::Result<()> {
        if sequence > self.upstream.get()
            || sequence > self.ring_buffer.cursor()
            || sequence != self.last + 1
            || event.value != sequence
        {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
        self.last = sequence;
        Ok(())
    }
}

#[test]
fn test_second_stage_never_passes_first_stage_under_stress() {
    init_tracing();
    const EVENTS: i64 = 5_000;

    let mut disruptor = Disruptor::new(
        DefaultEventFactory::<Payload>::new(),
        64,
        Arc::new(YieldingWaitStrategy::new()),
    )
    .unwrap();

    let processed = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let stage_one = disruptor
        .handle_events_with(StageOne {
            processed: processed.clone(),
        })
        .unwrap();
    let ring_buffer = disruptor.ring_buffer().clone();
    let stage_two = disruptor
        .handle_events_after(&stage_one, StageTwo {
            upstream: stage_one.sequences()[0].clone(),
            ring_buffer,
            violations: violations.clone(),
            last: -1,
        })
        .unwrap();

    disruptor.start().unwrap();
    for value in 0..EVENTS {
        disruptor
            .publish_event(move |e: &mut Payload, _s: i64| e.value = value)
            .unwrap();
        // Stage two may lag stage one, never lead it
        let downstream = disruptor.sequence_value_for(&stage_two);
        assert!(downstream <= disruptor.sequence_value_for(&stage_one));
    }
    disruptor.shutdown(Some(Duration::from_secs(30))).unwrap();

    assert_eq!(violations.load(Ordering::Relaxed), 0);
    assert_eq!(processed.load(Ordering::Relaxed), EVENTS as usize);
    assert_eq!(disruptor.sequence_value_for(&stage_two), EVENTS - 1);
}
