use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Global knobs that tune the analysis orchestrator.
///
/// All fields carry defaults so a host can supply a partial TOML document
/// (or none at all).
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Queued-job capacity.
    pub queue: QueueConfig,
    /// Intermediate result publication cadence.
    pub streaming: StreamingConfig,
    /// Cancellation watchdog cadence.
    pub watchdog: WatchdogConfig,
    /// Run event broadcast sizing.
    pub events: EventsConfig,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of distinct queued jobs. Merges never consume capacity.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 5 }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Delay between the first recorded finding and the publication of the
    /// accumulated snapshot.
    pub debounce_ms: u64,
}

impl StreamingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// How often the external cancellation signal is polled while an engine
    /// call is in flight.
    pub poll_interval_ms: u64,
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: OrchestratorConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == 0 {
            return Err(AnalysisError::Config(
                "queue.capacity must be at least 1".to_string(),
            ));
        }
        if self.streaming.debounce_ms == 0 {
            return Err(AnalysisError::Config(
                "streaming.debounce_ms must be at least 1".to_string(),
            ));
        }
        if self.watchdog.poll_interval_ms == 0 {
            return Err(AnalysisError::Config(
                "watchdog.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(AnalysisError::Config(
                "events.channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
