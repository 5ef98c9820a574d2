use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::throughput::{DEFAULT_WINDOW, DEFAULT_WORKERS};

/// Measurement tunables, loaded from an optional TOML file. Every field has
/// a default so a missing or partial file still yields a usable config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SprintConfig {
    /// Connections (and concurrent workers) per throughput test.
    pub workers: usize,

    /// Length of each throughput test window, in seconds.
    pub window_secs: u64,

    /// Ping samples taken per candidate during server selection.
    pub select_samples: u32,

    /// Ping samples taken for the reported latency figure.
    pub ping_samples: u32,

    /// Attempts for the retry-wrapped pipeline steps.
    pub retry_attempts: u32,

    /// Delay between retry attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            window_secs: DEFAULT_WINDOW.as_secs(),
            select_samples: 3,
            ping_samples: 5,
            retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl SprintConfig {
    pub fn load(path: &Path) -> Result<Self, SprintConfigLoadError> {
        let raw = fs::read_to_string(path).map_err(SprintConfigLoadError::Io)?;
        let config = toml::from_str(&raw).map_err(SprintConfigLoadError::Parse)?;
        Ok(config)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SprintConfigLoadError {
    #[error("could not open config")]
    Io(#[from] std::io::Error),
    #[error("could not parse config")]
    Parse(#[from] toml::de::Error),
}
