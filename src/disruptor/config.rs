//! Configuration Management
//!
//! Serializable description of a disruptor: ring size, wait strategy and
//! thread policy. Missing fields fall back to their defaults, so `{}` is a
//! valid configuration.

use crate::disruptor::{
    is_power_of_two, BlockingWaitStrategy, BusySpinWaitStrategy, DisruptorError, Result,
    SleepingWaitStrategy, TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Disruptor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Number of ring slots, must be a power of two
    pub buffer_size: usize,
    /// How consumers wait for events
    pub wait_strategy: WaitStrategyConfig,
    /// Processor threads are named `{prefix}-{n}`
    pub thread_name_prefix: String,
    /// Pin processor threads round-robin across the available cores
    pub pin_to_cores: bool,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            wait_strategy: WaitStrategyConfig::default(),
            thread_name_prefix: "processor".to_string(),
            pin_to_cores: false,
        }
    }
}

/// Wait strategy selection and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitStrategyConfig {
    BusySpin,
    Yielding {
        #[serde(default = "default_spin_tries")]
        spin_tries: u32,
    },
    Sleeping {
        #[serde(default = "default_retries")]
        retries: u32,
        #[serde(default = "default_sleep_time_ns")]
        sleep_time_ns: u64,
    },
    Blocking,
    TimeoutBlocking {
        timeout_ms: u64,
    },
}

fn default_spin_tries() -> u32 {
    100
}

fn default_retries() -> u32 {
    200
}

fn default_sleep_time_ns() -> u64 {
    100
}

impl Default for WaitStrategyConfig {
    fn default() -> Self {
        WaitStrategyConfig::Sleeping {
            retries: default_retries(),
            sleep_time_ns: default_sleep_time_ns(),
        }
    }
}

impl DisruptorConfig {
    /// Parse and validate a JSON configuration
    ///
    /// # Errors
    /// `DisruptorError::Config` if the document is malformed or invalid
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DisruptorError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DisruptorError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DisruptorError::Config(format!("failed to serialize configuration: {e}")))
    }

    /// Check the configuration without building anything
    ///
    /// # Errors
    /// `DisruptorError::InvalidBufferSize` for a bad ring size,
    /// `DisruptorError::Config` for anything else
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(self.buffer_size));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(DisruptorError::Config(
                "thread name prefix cannot be empty".to_string(),
            ));
        }

        match self.wait_strategy {
            WaitStrategyConfig::TimeoutBlocking { timeout_ms: 0 } => Err(DisruptorError::Config(
                "timeout must be greater than 0".to_string(),
            )),
            WaitStrategyConfig::Sleeping { retries: 0, .. } => Err(
                DisruptorError::Config("sleeping retries must be greater than 0".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub fn build_wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        match self.wait_strategy {
            WaitStrategyConfig::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            WaitStrategyConfig::Yielding { spin_tries } => {
                Arc::new(YieldingWaitStrategy::with_spin_tries(spin_tries))
            }
            WaitStrategyConfig::Sleeping {
                retries,
                sleep_time_ns,
            } => Arc::new(SleepingWaitStrategy::with_params(
                retries,
                Duration::from_nanos(sleep_time_ns),
            )),
            WaitStrategyConfig::Blocking => Arc::new(BlockingWaitStrategy::new()),
            WaitStrategyConfig::TimeoutBlocking { timeout_ms } => Arc::new(
                TimeoutBlockingWaitStrategy::new(Duration::from_millis(timeout_ms)),
            ),
        }
    }
}
