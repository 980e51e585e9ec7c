//! Ring Buffer Implementation
//!
//! The ring buffer owns a pre-allocated circular array of events and the
//! sequencer that coordinates access to it. Consumers read it through
//! `DataProvider`; the single producer claims and publishes through the one
//! `Producer` handle the buffer hands out.
//!
//! Ownership of a slot moves from the producer (between claim and publish) to
//! the consumers (after publish, until the producer wraps around to it again).
//! The sequencer's gating check is what keeps those two phases apart.

use crate::disruptor::core_interfaces::{Cursored, DataProvider, Sequenced};
use crate::disruptor::{
    is_power_of_two, DisruptorError, EventFactory, EventTranslator, EventTranslatorOneArg,
    EventTranslatorTwoArg, ProcessingSequenceBarrier, Result, Sequence, Sequencer,
    SingleProducerSequencer, WaitStrategy,
};
use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pre-allocated circular event store
///
/// # Type Parameters
/// * `T` - The event type stored in the buffer
pub struct RingBuffer<T> {
    /// Using `Box<[UnsafeCell<T>]>` for better memory layout than `Vec<T>`
    slots: Box<[UnsafeCell<T>]>,
    /// buffer_size - 1, sequences are masked instead of taken modulo
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
    /// Set while a `Producer` for this buffer is alive
    producer_taken: AtomicBool,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer backed by a single-producer sequencer
    ///
    /// # Arguments
    /// * `buffer_size` - Number of slots, must be a power of two
    /// * `wait_strategy` - Strategy consumers use to wait for events
    /// * `event_factory` - Called once per slot to pre-populate the buffer
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `buffer_size` is not a power of two
    pub fn create<F>(
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        event_factory: F,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::create_single_producer(event_factory, buffer_size, wait_strategy)
    }

    /// Create a ring buffer backed by a single-producer sequencer
    pub fn create_single_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let sequencer = SingleProducerSequencer::new(buffer_size, wait_strategy)?;
        Self::with_sequencer(event_factory, sequencer)
    }

    /// Create a ring buffer around a sequencer
    ///
    /// The sequencer is taken by value: claims and publishes may only reach
    /// it through this buffer's `Producer`.
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if the sequencer's buffer size
    /// is not a power of two
    pub fn with_sequencer<F>(event_factory: F, sequencer: SingleProducerSequencer) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let buffer_size = sequencer.get_buffer_size();
        if !is_power_of_two(buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(buffer_size));
        }

        let slots: Box<[UnsafeCell<T>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Ok(Self {
            slots,
            index_mask: (buffer_size - 1) as i64,
            sequencer: Arc::new(sequencer),
            producer_taken: AtomicBool::new(false),
        })
    }

    /// Get the event at `sequence`
    ///
    /// No staleness checking is done. Callers must only read sequences their
    /// barrier has reported as available.
    pub fn get(&self, sequence: i64) -> &T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: the mask keeps the index in bounds, and published slots are
        // only read until the producer wraps past every gating sequence
        unsafe { &*self.slots.get_unchecked(index).get() }
    }

    /// Get mutable access to the event at a claimed `sequence`
    ///
    /// # Safety
    /// `sequence` must have been claimed by the caller and not yet published,
    /// and no other reference to the same slot may be alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut T {
        let index = (sequence & self.index_mask) as usize;
        &mut *self.slots.get_unchecked(index).get()
    }

    /// Whether `sequence` has been published
    pub fn is_published(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Position of the slowest gating sequence, or the cursor when there is none
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.minimum_sequence()
    }

    /// Create a barrier that gates on the cursor and on `sequences_to_track`
    pub fn new_barrier(&self, sequences_to_track: Vec<Arc<Sequence>>) -> ProcessingSequenceBarrier {
        ProcessingSequenceBarrier::new(Arc::clone(&self.sequencer), sequences_to_track)
    }

    /// The producer cursor
    pub fn cursor(&self) -> i64 {
        self.sequencer.get_cursor()
    }

    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    pub fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.sequencer.has_available_capacity(required_capacity)
    }

    /// Take the producing side of this ring buffer
    ///
    /// There is at most one live `Producer` per ring buffer; it is released
    /// again when dropped.
    ///
    /// # Errors
    /// `DisruptorError::IllegalState` while another `Producer` is alive
    pub fn producer(self: &Arc<Self>) -> Result<Producer<T>> {
        if self
            .producer_taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DisruptorError::IllegalState(
                "ring buffer already has a producer".to_string(),
            ));
        }
        Ok(Producer {
            ring_buffer: Arc::clone(self),
            _unsync: PhantomData,
        })
    }
}

/// Opts out of `Sync` while staying `Send`
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// The producing side of a `RingBuffer`
///
/// Only one `Producer` exists per ring buffer at a time, and it is `Send` but
/// not `Sync`, so claims are never made from two threads at once. Methods that
/// write slots take `&mut self`, which also keeps a translator from publishing
/// through the same producer while its slot is still being written.
///
/// ```compile_fail
/// fn shared_between_threads<T: Sync>() {}
/// shared_between_threads::<seqring::disruptor::Producer<i64>>();
/// ```
pub struct Producer<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    _unsync: PhantomUnsync,
}

impl<T> Producer<T> {
    /// Claim one slot, populate it, and publish it
    ///
    /// The slot is published even if `translator` panics, so downstream
    /// consumers never stall on a lost sequence.
    pub fn publish_event<E>(&mut self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        let sequence = self.sequencer().next()?;
        self.translate_and_publish(sequence, |event| translator.translate_to(event, sequence));
        Ok(())
    }

    /// Claim one slot and populate it from `arg0`
    pub fn publish_event_one_arg<A, E>(&mut self, translator: E, arg0: A) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
    {
        let sequence = self.sequencer().next()?;
        self.translate_and_publish(sequence, |event| {
            translator.translate_to(event, sequence, arg0)
        });
        Ok(())
    }

    /// Claim one slot and populate it from `arg0` and `arg1`
    pub fn publish_event_two_arg<A, B, E>(
        &mut self,
        translator: E,
        arg0: A,
        arg1: B,
    ) -> Result<()>
    where
        E: EventTranslatorTwoArg<T, A, B>,
    {
        let sequence = self.sequencer().next()?;
        self.translate_and_publish(sequence, |event| {
            translator.translate_to(event, sequence, arg0, arg1)
        });
        Ok(())
    }

    /// Like `publish_event` but fails instead of waiting for capacity
    ///
    /// # Errors
    /// `DisruptorError::InsufficientCapacity` if the buffer is full
    pub fn try_publish_event<E>(&mut self, translator: E) -> Result<()>
    where
        E: EventTranslator<T>,
    {
        let sequence = self.sequencer().try_next()?;
        self.translate_and_publish(sequence, |event| translator.translate_to(event, sequence));
        Ok(())
    }

    /// Claim a contiguous range, populate one slot per argument, and publish
    /// the whole range at once
    ///
    /// If `args` yields a different number of items than its `len()` promised,
    /// the claim is rolled back and nothing is published.
    ///
    /// # Errors
    /// `DisruptorError::InvalidArgument` if `args` is empty, larger than the
    /// buffer, or misreports its length
    pub fn publish_events<A, E, I>(&mut self, translator: E, args: I) -> Result<()>
    where
        E: EventTranslatorOneArg<T, A>,
        I: IntoIterator<Item = A>,
        I::IntoIter: ExactSizeIterator,
    {
        let mut args = args.into_iter();
        let batch_size = args.len() as i64;
        let hi = self.sequencer().next_n(batch_size)?;
        let lo = hi - (batch_size - 1);

        let guard = PublishGuard {
            sequencer: self.sequencer(),
            lo,
            hi,
        };
        let mut populated = 0;
        for sequence in lo..=hi {
            let Some(arg) = args.next() else { break };
            // SAFETY: lo..=hi was claimed above and is unpublished until the guard drops
            let event = unsafe { self.ring_buffer.get_mut(sequence) };
            translator.translate_to(event, sequence, arg);
            populated += 1;
        }

        if populated != batch_size || args.next().is_some() {
            // Nothing past lo - 1 was published, so the claim can be handed back
            std::mem::forget(guard);
            self.sequencer().claim(lo - 1);
            return Err(DisruptorError::InvalidArgument(format!(
                "iterator reported {batch_size} items but yielded a different number"
            )));
        }
        Ok(())
    }

    fn translate_and_publish<F>(&mut self, sequence: i64, populate: F)
    where
        F: FnOnce(&mut T),
    {
        let _guard = PublishGuard {
            sequencer: self.sequencer(),
            lo: sequence,
            hi: sequence,
        };
        // SAFETY: the sequence was just claimed by this producer
        populate(unsafe { self.ring_buffer.get_mut(sequence) });
    }

    /// Claim the next sequence, waiting for capacity
    pub fn next(&self) -> Result<i64> {
        self.sequencer().next()
    }

    /// Claim the next `n` sequences, waiting for capacity
    pub fn next_n(&self, n: i64) -> Result<i64> {
        self.sequencer().next_n(n)
    }

    /// Claim the next sequence or fail with `InsufficientCapacity`
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer().try_next()
    }

    /// Claim the next `n` sequences or fail with `InsufficientCapacity`
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer().try_next_n(n)
    }

    pub fn publish(&self, sequence: i64) {
        self.sequencer().publish(sequence);
    }

    pub fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer().publish_range(lo, hi);
    }

    /// Move the producer to `sequence` and publish it
    ///
    /// Only valid while no consumers are running, for example when restoring
    /// from a journal.
    pub fn reset_to(&mut self, sequence: i64) {
        self.sequencer().claim(sequence);
        self.sequencer().publish(sequence);
    }

    /// Claim `sequence` directly and hand back its slot for population
    ///
    /// # Safety
    /// No consumers may be running, and the slot must be published before it
    /// is claimed again.
    pub unsafe fn claim_and_get_preallocated(&mut self, sequence: i64) -> &mut T {
        self.sequencer().claim(sequence);
        self.ring_buffer.get_mut(sequence)
    }

    /// The ring buffer this producer writes into
    pub fn ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring_buffer
    }

    /// The producer cursor
    pub fn cursor(&self) -> i64 {
        self.ring_buffer.cursor()
    }

    fn sequencer(&self) -> &dyn Sequencer {
        self.ring_buffer.sequencer.as_ref()
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.ring_buffer
            .producer_taken
            .store(false, Ordering::Release);
    }
}

impl<T> Cursored for Producer<T> {
    fn get_cursor(&self) -> i64 {
        self.ring_buffer.cursor()
    }
}

impl<T> Sequenced for Producer<T> {
    fn get_buffer_size(&self) -> usize {
        self.ring_buffer.buffer_size()
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.sequencer().has_available_capacity(required_capacity)
    }

    fn remaining_capacity(&self) -> i64 {
        self.sequencer().remaining_capacity()
    }

    fn next(&self) -> Result<i64> {
        self.sequencer().next()
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        self.sequencer().next_n(n)
    }

    fn try_next(&self) -> Result<i64> {
        self.sequencer().try_next()
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer().try_next_n(n)
    }

    fn publish(&self, sequence: i64) {
        self.sequencer().publish(sequence);
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer().publish_range(lo, hi);
    }
}

impl<T> std::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("cursor", &self.ring_buffer.cursor())
            .finish_non_exhaustive()
    }
}

/// Publishes a claimed range when dropped, including during unwinding
struct PublishGuard<'a> {
    sequencer: &'a dyn Sequencer,
    lo: i64,
    hi: i64,
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.sequencer.publish_range(self.lo, self.hi);
    }
}

// SAFETY: slot access is coordinated through the sequencer; a slot is written
// only by the single `Producer` between claim and publish, and read by
// consumers only after publish, with Release/Acquire on the cursor ordering
// the two
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

impl<T: Send + Sync> DataProvider<T> for RingBuffer<T> {
    fn get(&self, sequence: i64) -> &T {
        RingBuffer::get(self, sequence)
    }
}

impl<T> Cursored for RingBuffer<T> {
    fn get_cursor(&self) -> i64 {
        self.sequencer.get_cursor()
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.slots.len())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}
