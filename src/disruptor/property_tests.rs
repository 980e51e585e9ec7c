//! Property-based tests for disruptor components
//!
//! These tests use proptest to verify properties that should hold for all inputs

use crate::disruptor::{
    event_factory::DefaultEventFactory,
    event_processor::{BatchEventProcessor, EventProcessor},
    ring_buffer::RingBuffer,
    sequence::{FixedSequenceGroup, Sequence},
    sequencer::{Sequencer, SingleProducerSequencer},
    util::get_minimum_sequence,
    wait_strategy::{BlockingWaitStrategy, BusySpinWaitStrategy},
    ClosureEventHandler, Cursored, DisruptorError, Sequenced, INITIAL_CURSOR_VALUE,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Property tests for Sequence
mod sequence_properties {
    use super::*;

    proptest! {
        #[test]
        fn sequence_get_set_consistency(value in any::<i64>()) {
            let seq = Sequence::new(0);
            seq.set(value);
            prop_assert_eq!(seq.get(), value);
            seq.set_volatile(value / 2);
            prop_assert_eq!(seq.get(), value / 2);
        }

        #[test]
        fn sequence_add_and_get_consistency(initial in -1_000_000i64..1_000_000, delta in -1000i64..1000) {
            let seq = Sequence::new(initial);
            prop_assert_eq!(seq.add_and_get(delta), initial + delta);
            prop_assert_eq!(seq.get_and_add(delta), initial + delta);
            prop_assert_eq!(seq.get(), initial + 2 * delta);
        }

        #[test]
        fn sequence_compare_and_set_failure(initial in any::<i64>(), wrong_expected in any::<i64>(), new_value in any::<i64>()) {
            prop_assume!(wrong_expected != initial);
            let seq = Sequence::new(initial);
            prop_assert!(!seq.compare_and_set(wrong_expected, new_value));
            prop_assert_eq!(seq.get(), initial);
            prop_assert!(seq.compare_and_set(initial, new_value));
            prop_assert_eq!(seq.get(), new_value);
        }

        #[test]
        fn minimum_sequence_matches_iterator_min(values in prop::collection::vec(any::<i64>(), 0..16), floor in any::<i64>()) {
            let sequences: Vec<Arc<Sequence>> = values.iter().map(|&v| Arc::new(Sequence::new(v))).collect();
            let expected = values.iter().copied().chain(std::iter::once(floor)).min().unwrap_or(floor);
            prop_assert_eq!(get_minimum_sequence(&sequences, floor), expected);

            let group = FixedSequenceGroup::new(sequences);
            let expected_group = values.iter().copied().min().unwrap_or(i64::MAX);
            prop_assert_eq!(group.get(), expected_group);
        }
    }
}

/// Property tests for the single-producer claim protocol
mod sequencer_properties {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Claim(i64),
        Consume(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..8).prop_map(Op::Claim),
            (0i64..8).prop_map(Op::Consume),
        ]
    }

    proptest! {
        #[test]
        fn claim_never_outruns_gating(size_power in 0u32..5, ops in prop::collection::vec(op(), 1..200)) {
            let capacity = 1i64 << size_power;
            let sequencer = SingleProducerSequencer::new(capacity as usize, Arc::new(BusySpinWaitStrategy::new())).unwrap();
            let consumer = Arc::new(Sequence::default());
            sequencer.add_gating_sequences(&[consumer.clone()]);

            let mut claimed = INITIAL_CURSOR_VALUE;
            for op in ops {
                match op {
                    Op::Claim(n) => match sequencer.try_next_n(n) {
                        Ok(hi) => {
                            prop_assert_eq!(hi, claimed + n);
                            prop_assert!(hi - capacity <= consumer.get());
                            claimed = hi;
                            sequencer.publish(hi);
                        }
                        Err(DisruptorError::InsufficientCapacity) => {
                            prop_assert!(claimed + n - capacity > consumer.get());
                        }
                        Err(DisruptorError::InvalidArgument(_)) => prop_assert!(n > capacity),
                        Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                    },
                    Op::Consume(k) => {
                        // The consumer can only read what was published
                        let target = (consumer.get() + k).min(sequencer.get_cursor());
                        consumer.set(target);
                    }
                }
                prop_assert!(consumer.get() <= sequencer.get_cursor());
                prop_assert_eq!(sequencer.remaining_capacity(), capacity - (claimed - consumer.get()));
            }
        }

        #[test]
        fn failed_try_next_leaves_position_unchanged(size_power in 0u32..6, attempts in 1usize..10) {
            let capacity = 1i64 << size_power;
            let sequencer = SingleProducerSequencer::new(capacity as usize, Arc::new(BusySpinWaitStrategy::new())).unwrap();
            let consumer = Arc::new(Sequence::default());
            sequencer.add_gating_sequences(&[consumer.clone()]);

            let hi = sequencer.try_next_n(capacity).unwrap();
            sequencer.publish(hi);
            for _ in 0..attempts {
                prop_assert!(matches!(sequencer.try_next(), Err(DisruptorError::InsufficientCapacity)));
            }

            consumer.set(0);
            prop_assert_eq!(sequencer.try_next().unwrap(), capacity);
        }
    }
}

/// Property tests for batch delivery
mod batch_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn end_of_batch_only_on_last_event(batch_size in 1i64..=64) {
            let ring_buffer = Arc::new(
                RingBuffer::create(64, Arc::new(BlockingWaitStrategy::new()), DefaultEventFactory::<i64>::new()).unwrap(),
            );
            let seen = Arc::new(Mutex::new(Vec::new()));
            let recorder = seen.clone();
            let processor = Arc::new(BatchEventProcessor::new(
                ring_buffer.clone(),
                Arc::new(ring_buffer.new_barrier(Vec::new())),
                ClosureEventHandler::new(move |_event: &i64, sequence, end_of_batch| {
                    recorder.lock().push((sequence, end_of_batch));
                    Ok(())
                }),
            ));

            let producer = ring_buffer.producer().unwrap();
            let hi = producer.next_n(batch_size).unwrap();
            producer.publish_range(0, hi);

            let runner = processor.clone();
            let handle = thread::spawn(move || runner.run());
            let deadline = Instant::now() + Duration::from_secs(5);
            while processor.get_sequence().get() < hi && Instant::now() < deadline {
                thread::yield_now();
            }
            processor.halt();
            handle.join().unwrap().unwrap();

            let seen = seen.lock();
            prop_assert_eq!(seen.len() as i64, batch_size);
            for (index, &(sequence, end_of_batch)) in seen.iter().enumerate() {
                prop_assert_eq!(sequence, index as i64);
                prop_assert_eq!(end_of_batch, sequence == hi);
            }
        }
    }
}
