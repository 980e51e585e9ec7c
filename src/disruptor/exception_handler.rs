//! Exception Handler Implementation
//!
//! Exception handlers decide what happens when an event handler fails. An
//! `Ok` return means the processor skips the faulted event and keeps going.
//! An `Err` return is fatal: the processor stops and reports the error.

use crate::disruptor::{DisruptorError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info};

/// Handler for failures raised by event handlers
///
/// # Type Parameters
/// * `T` - The event type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// Handle a failure raised while processing `sequence`
    ///
    /// `event` is `None` when the failure did not come from a specific event,
    /// for example from a timeout notification.
    ///
    /// # Errors
    /// Returning an error stops the processor
    fn handle_event_exception(
        &self,
        error: &anyhow::Error,
        sequence: i64,
        event: Option<&T>,
    ) -> Result<()>;

    /// Handle a failure raised by the handler's start hook
    fn handle_on_start_exception(&self, error: &anyhow::Error);

    /// Handle a failure raised by the handler's shutdown hook
    fn handle_on_shutdown_exception(&self, error: &anyhow::Error);
}

/// Logs the failure and stops the processor
#[derive(Debug, Default, Clone, Copy)]
pub struct FatalExceptionHandler;

impl FatalExceptionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler {
    fn handle_event_exception(
        &self,
        error: &anyhow::Error,
        sequence: i64,
        _event: Option<&T>,
    ) -> Result<()> {
        error!(sequence, error = %error, "Exception processing event");
        Err(DisruptorError::Fatal {
            sequence,
            message: format!("{error:#}"),
        })
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        error!(error = %error, "Exception during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        error!(error = %error, "Exception during on_shutdown");
    }
}

/// Logs the failure and lets the processor skip the event
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreExceptionHandler;

impl IgnoreExceptionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler {
    fn handle_event_exception(
        &self,
        error: &anyhow::Error,
        sequence: i64,
        _event: Option<&T>,
    ) -> Result<()> {
        info!(sequence, error = %error, "Exception processing event, skipping");
        Ok(())
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        info!(error = %error, "Exception during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        info!(error = %error, "Exception during on_shutdown");
    }
}

/// Exception handler whose delegate can be replaced after wiring
///
/// Processors are built with the wrapper before the user has necessarily
/// picked a default policy; `switch_to` swaps the policy for all of them.
/// Until switched, failures are fatal.
pub struct ExceptionHandlerWrapper<T> {
    delegate: RwLock<Arc<dyn ExceptionHandler<T>>>,
}

impl<T: 'static> ExceptionHandlerWrapper<T> {
    pub fn new() -> Self {
        Self {
            delegate: RwLock::new(Arc::new(FatalExceptionHandler)),
        }
    }

    /// Replace the delegate
    pub fn switch_to(&self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        *self.delegate.write() = exception_handler;
    }

    fn current(&self) -> Arc<dyn ExceptionHandler<T>> {
        Arc::clone(&self.delegate.read())
    }
}

impl<T: 'static> Default for ExceptionHandlerWrapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ExceptionHandler<T> for ExceptionHandlerWrapper<T> {
    fn handle_event_exception(
        &self,
        error: &anyhow::Error,
        sequence: i64,
        event: Option<&T>,
    ) -> Result<()> {
        self.current().handle_event_exception(error, sequence, event)
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        self.current().handle_on_start_exception(error);
    }

    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        self.current().handle_on_shutdown_exception(error);
    }
}

impl<T> std::fmt::Debug for ExceptionHandlerWrapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionHandlerWrapper").finish_non_exhaustive()
    }
}
