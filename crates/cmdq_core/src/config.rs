//! # Queue Configuration
//!
//! Construction-time settings for a [`CommandQueue`](crate::CommandQueue).
//! There is no runtime reconfiguration: arenas grow on demand and the
//! consumer thread lives as long as the queue.

use serde::Deserialize;

use crate::error::{QueueError, QueueResult};

/// Configuration for a command queue.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Initial capacity of EACH of the two arenas, in bytes.
    pub initial_capacity: usize,
    /// Name given to the consumer thread.
    pub thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: Self::DEFAULT_CAPACITY,
            thread_name: String::from("cmdq-consumer"),
        }
    }
}

impl QueueConfig {
    /// Default arena capacity in bytes.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Preset for queues fed by many producers at high rates.
    ///
    /// Arenas start at 64 KiB so bursts of ~5000 small records fit
    /// without a single reallocation.
    #[must_use]
    pub fn high_throughput() -> Self {
        Self {
            initial_capacity: 64 * 1024,
            ..Self::default()
        }
    }

    /// Sets the initial arena capacity.
    #[must_use]
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Sets the consumer thread name.
    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Checks the configuration for values the queue cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] for a zero or larger-than-`u32`
    /// capacity, or a thread name containing a NUL byte.
    pub fn validate(&self) -> QueueResult<()> {
        if self.initial_capacity == 0 {
            return Err(QueueError::InvalidConfig(
                "initial_capacity must be greater than zero".to_string(),
            ));
        }
        if u32::try_from(self.initial_capacity).is_err() {
            return Err(QueueError::InvalidConfig(format!(
                "initial_capacity {} exceeds u32::MAX",
                self.initial_capacity
            )));
        }
        if self.thread_name.contains('\0') {
            return Err(QueueError::InvalidConfig(
                "thread_name must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a TOML configuration.
    ///
    /// Missing keys fall back to [`QueueConfig::default`].
    ///
    /// ```toml
    /// initial_capacity = 4096
    /// thread_name = "audio-commands"
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if the text is not valid TOML for
    /// this struct or fails [`QueueConfig::validate`].
    pub fn from_toml_str(text: &str) -> QueueResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| QueueError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
