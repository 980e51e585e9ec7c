//! Event Handler Implementation
//!
//! User callbacks driven by a `BatchEventProcessor`. Besides `on_event`, a
//! handler can observe its own lifecycle, the start of each batch and wait
//! timeouts. Every hook other than `on_event` defaults to a no-op.

use anyhow::Result;

/// Callback interface for consuming events from the ring buffer
///
/// Handlers are owned by exactly one processor thread, hence `&mut self`.
/// Events are shared by every consumer of the slot, hence `&T`.
///
/// # Errors
/// An `Err` from any hook is routed to the processor's exception handler.
pub trait EventHandler<T>: Send {
    /// Called once per published event, in sequence order
    ///
    /// # Arguments
    /// * `event` - The published event
    /// * `sequence` - Its sequence number
    /// * `end_of_batch` - Whether this is the last event of the current batch
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()>;

    /// Called on the processor thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called on the processor thread just before it exits
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called before each batch with the number of events in it
    fn on_batch_start(&mut self, _batch_size: i64) -> Result<()> {
        Ok(())
    }

    /// Called when a timeout-aware wait strategy gives up waiting
    ///
    /// `sequence` is the last sequence the processor completed.
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }
}

/// Event handler backed by a closure
pub struct ClosureEventHandler<F> {
    handler_fn: F,
}

impl<F> ClosureEventHandler<F> {
    pub fn new<T>(handler_fn: F) -> Self
    where
        F: FnMut(&T, i64, bool) -> Result<()> + Send,
    {
        Self { handler_fn }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (self.handler_fn)(event, sequence, end_of_batch)
    }
}
