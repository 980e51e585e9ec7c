//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer waits for the sequence it needs.
//! They trade latency for CPU: busy-spin never leaves the core, sleeping
//! escalates from spinning to yielding to parking, blocking parks on a
//! condition variable until the producer signals.

use crate::disruptor::{DisruptorError, FixedSequenceGroup, Result, Sequence, SequenceBarrier};
use parking_lot::{Condvar, Mutex};
use std::hint;
use std::thread;
use std::time::{Duration, Instant};

/// Strategy for waiting for events to become available
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait until `dependent_sequence` reaches `sequence`
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    /// * `cursor` - The producer cursor
    /// * `dependent_sequence` - The sequences this consumer must not overtake
    /// * `barrier` - The barrier waiting, re-checked for alerts on every retry
    ///
    /// # Returns
    /// The highest available sequence, which may be above `sequence`
    ///
    /// # Errors
    /// `DisruptorError::Alert` if the barrier was alerted while waiting,
    /// `DisruptorError::Timeout` from timeout-aware strategies.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequence: &FixedSequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64>;

    /// Wake any consumer parked inside this strategy
    ///
    /// Called by the producer after every publish and by barriers on alert.
    fn signal_all_when_blocking(&self);
}

/// Busy-spin wait strategy
///
/// Lowest latency, but burns a full core while waiting. Only use it when
/// consumer threads have dedicated cores.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent_sequence: &FixedSequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        loop {
            let available_sequence = dependent_sequence.get();
            if available_sequence >= sequence {
                return Ok(available_sequence);
            }
            barrier.check_alert()?;
            hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Yielding wait strategy
///
/// Spins for a number of tries, then gives up its time slice on each retry.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    const DEFAULT_SPIN_TRIES: u32 = 100;

    pub fn new() -> Self {
        Self::with_spin_tries(Self::DEFAULT_SPIN_TRIES)
    }

    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent_sequence: &FixedSequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut counter = self.spin_tries;
        loop {
            let available_sequence = dependent_sequence.get();
            if available_sequence >= sequence {
                return Ok(available_sequence);
            }
            barrier.check_alert()?;
            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Sleeping wait strategy
///
/// Escalates through three phases per wait:
/// 1. busy-spin while `counter > SPIN_THRESHOLD`
/// 2. yield while `counter > 0`
/// 3. park for `sleep_time` on every further retry
///
/// With the defaults that is roughly 100 spins, 100 yields, then 100ns parks.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep_time: Duration,
}

impl SleepingWaitStrategy {
    const SPIN_THRESHOLD: u32 = 100;
    const DEFAULT_RETRIES: u32 = 200;
    const DEFAULT_SLEEP: Duration = Duration::from_nanos(100);

    pub fn new() -> Self {
        Self::with_params(Self::DEFAULT_RETRIES, Self::DEFAULT_SLEEP)
    }

    /// Create a sleeping strategy with a custom retry budget and park duration
    pub fn with_params(retries: u32, sleep_time: Duration) -> Self {
        Self {
            retries,
            sleep_time,
        }
    }

    fn apply_wait_method(&self, barrier: &dyn SequenceBarrier, counter: u32) -> Result<u32> {
        barrier.check_alert()?;

        if counter > Self::SPIN_THRESHOLD {
            hint::spin_loop();
            Ok(counter - 1)
        } else if counter > 0 {
            thread::yield_now();
            Ok(counter - 1)
        } else {
            thread::park_timeout(self.sleep_time);
            Ok(counter)
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent_sequence: &FixedSequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut counter = self.retries;
        loop {
            let available_sequence = dependent_sequence.get();
            if available_sequence >= sequence {
                return Ok(available_sequence);
            }
            counter = self.apply_wait_method(barrier, counter)?;
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Blocking wait strategy
///
/// Parks on a condition variable until the producer cursor reaches the
/// requested sequence, then spins briefly on the dependent sequences. Lowest
/// CPU use, highest wake-up latency.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequence: &FixedSequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
            }
        }

        spin_on_dependents(sequence, dependent_sequence, barrier)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking wait strategy that gives up after a fixed duration
///
/// Returns `DisruptorError::Timeout` when the cursor has not reached the
/// requested sequence in time. The batch processor reports this to the
/// handler's `on_timeout` hook and keeps waiting.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequence: &FixedSequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let deadline = Instant::now() + self.timeout;
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                if self.condvar.wait_until(&mut guard, deadline).timed_out()
                    && cursor.get() < sequence
                {
                    return Err(DisruptorError::Timeout);
                }
            }
        }

        spin_on_dependents(sequence, dependent_sequence, barrier)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

fn spin_on_dependents(
    sequence: i64,
    dependent_sequence: &FixedSequenceGroup,
    barrier: &dyn SequenceBarrier,
) -> Result<i64> {
    loop {
        let available_sequence = dependent_sequence.get();
        if available_sequence >= sequence {
            return Ok(available_sequence);
        }
        barrier.check_alert()?;
        hint::spin_loop();
    }
}
