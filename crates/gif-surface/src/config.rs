use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How many times the frame sequence should play, as supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationCount {
    /// Loop forever.
    #[default]
    Infinite,
    /// Play the whole sequence exactly `n` times.
    Finite(u32),
    /// Use the loop count embedded in the stream (NETSCAPE extension).
    Source,
}

/// Playback options for one animation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub iterations: IterationCount,
    /// Send `Play` as part of `start()`. When false the worker stays paused
    /// until the application calls `play()`.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Declared frame delays below this are clamped up to it.
    #[serde(default = "default_min_frame_delay_ms")]
    pub min_frame_delay_ms: u32,
}

fn default_true() -> bool {
    true
}

fn default_min_frame_delay_ms() -> u32 {
    20
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            iterations: IterationCount::Infinite,
            auto_start: true,
            min_frame_delay_ms: default_min_frame_delay_ms(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_iterations(mut self, iterations: IterationCount) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_min_frame_delay_ms(mut self, ms: u32) -> Self {
        self.min_frame_delay_ms = ms;
        self
    }

    pub fn min_frame_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.min_frame_delay_ms))
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid playback config: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}
