//! Thread management and CPU affinity
//!
//! Every event processor gets its own named OS thread. Threads can optionally
//! be pinned to CPU cores, assigned round-robin in spawn order.

use crate::disruptor::{DisruptorError, Result};
use core_affinity::CoreId;
use std::thread::{self, JoinHandle};
use tracing::warn;

/// Naming and pinning policy for processor threads
#[derive(Debug, Clone)]
pub struct ThreadContext {
    name_prefix: String,
    /// Cores to pin to, empty means no pinning
    cores: Vec<CoreId>,
    spawned: usize,
}

impl ThreadContext {
    /// Threads will be named `{name_prefix}-{n}`, starting at 1
    pub fn new<S: Into<String>>(name_prefix: S) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            cores: Vec::new(),
            spawned: 0,
        }
    }

    /// Pin threads round-robin across every core the OS reports
    pub fn pin_to_all_cores(mut self) -> Self {
        self.cores = core_affinity::get_core_ids().unwrap_or_default();
        if self.cores.is_empty() {
            warn!("core affinity is not supported here, threads will not be pinned");
        }
        self
    }

    /// Pin threads round-robin across the given cores
    ///
    /// # Errors
    /// `DisruptorError::Config` if any of the cores does not exist
    pub fn pin_at_cores(mut self, core_ids: &[usize]) -> Result<Self> {
        let available: Vec<usize> = core_affinity::get_core_ids()
            .unwrap_or_default()
            .iter()
            .map(|core| core.id)
            .collect();

        if let Some(missing) = core_ids.iter().find(|id| !available.contains(id)) {
            return Err(DisruptorError::Config(format!(
                "CPU core {missing} is not available, available cores: {available:?}"
            )));
        }

        self.cores = core_ids.iter().map(|&id| CoreId { id }).collect();
        Ok(self)
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    fn next_assignment(&mut self) -> (String, Option<CoreId>) {
        let affinity = if self.cores.is_empty() {
            None
        } else {
            Some(self.cores[self.spawned % self.cores.len()])
        };
        self.spawned += 1;
        (format!("{}-{}", self.name_prefix, self.spawned), affinity)
    }

    /// Spawn `f` on a new named, optionally pinned, thread
    ///
    /// # Errors
    /// `DisruptorError::IllegalState` if the OS refuses to create the thread
    pub fn spawn<F>(&mut self, f: F) -> Result<ManagedThread>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (thread_name, affinity) = self.next_assignment();

        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                if let Some(core_id) = affinity {
                    if !core_affinity::set_for_current(core_id) {
                        warn!(core = core_id.id, "failed to pin thread to core");
                    }
                }
                f()
            })
            .map_err(|e| {
                DisruptorError::IllegalState(format!("failed to spawn thread {thread_name}: {e}"))
            })?;

        Ok(ManagedThread {
            join_handle: Some(join_handle),
            thread_name,
            core: affinity.map(|core| core.id),
        })
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new("processor")
    }
}

/// Handle to a processor thread
///
/// Dropping it joins the thread, so the owner must stop the processor first.
pub struct ManagedThread {
    join_handle: Option<JoinHandle<Result<()>>>,
    thread_name: String,
    core: Option<usize>,
}

impl ManagedThread {
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// The core this thread was pinned to, if any
    pub fn core(&self) -> Option<usize> {
        self.core
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the thread to finish and return what it returned
    ///
    /// # Errors
    /// The thread's own error, or `DisruptorError::IllegalState` if it panicked
    pub fn join(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                DisruptorError::IllegalState(format!("thread {} panicked", self.thread_name))
            })?,
            None => Ok(()),
        }
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("thread_name", &self.thread_name)
            .field("core", &self.core)
            .field("running", &self.is_running())
            .finish()
    }
}
