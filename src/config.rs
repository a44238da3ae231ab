// Engine configuration - loaded from RON, every field optional

use crate::sequencer::timeline::Tempo;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler poll period
    pub poll_interval_ms: u64,
    pub live_queue_capacity: usize,
    pub output_queue_capacity: usize,
    pub notification_capacity: usize,
    /// Grid resolution for new projects
    pub ticks_per_quarter: u32,
    pub default_bpm: f64,
    pub default_bars: usize,
    pub default_steps_per_bar: usize,
    pub default_tracks: usize,
    /// Force live input onto this channel (0-15)
    pub live_channel: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2,
            live_queue_capacity: 256,
            output_queue_capacity: 1024,
            notification_capacity: 64,
            ticks_per_quarter: 480,
            default_bpm: 120.0,
            default_bars: 4,
            default_steps_per_bar: 16,
            default_tracks: 8,
            live_channel: None,
        }
    }
}

impl EngineConfig {
    pub fn from_ron(data: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_ron(&data)?;
        tracing::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        if !(1..=50).contains(&self.poll_interval_ms) {
            return invalid("poll_interval_ms must be between 1 and 50");
        }
        if self.live_queue_capacity == 0
            || self.output_queue_capacity == 0
            || self.notification_capacity == 0
        {
            return invalid("queue capacities must be greater than 0");
        }
        if !(1..=32767).contains(&self.ticks_per_quarter) {
            return invalid("ticks_per_quarter must be between 1 and 32767");
        }
        if Tempo::checked(self.default_bpm).is_none() {
            return invalid("default_bpm is outside the supported tempo range");
        }
        if self.default_bars == 0 || self.default_tracks == 0 {
            return invalid("default grid must have at least one bar and one track");
        }
        if !(1..=crate::sequencer::grid::SequencerGrid::MAX_STEPS_PER_BAR)
            .contains(&self.default_steps_per_bar)
        {
            return invalid("default_steps_per_bar must be between 1 and 192");
        }
        if self.live_channel.is_some_and(|c| c > 15) {
            return invalid("live_channel must be between 0 and 15");
        }
        Ok(())
    }

    pub fn default_tempo(&self) -> Tempo {
        Tempo::checked(self.default_bpm).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = EngineConfig::from_ron("(poll_interval_ms: 5, live_channel: Some(3))").unwrap();
        assert_eq!(config.poll_interval_ms, 5);
        assert_eq!(config.live_channel, Some(3));
        assert_eq!(config.ticks_per_quarter, 480);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            EngineConfig::from_ron("(poll_interval_ms: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(EngineConfig::from_ron("(live_queue_capacity: 0)").is_err());
        assert!(EngineConfig::from_ron("(default_bpm: 5000.0)").is_err());
        assert!(EngineConfig::from_ron("(live_channel: Some(16))").is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            EngineConfig::from_ron("(poll_interval_ms: \"fast\")"),
            Err(ConfigError::Parse(_))
        ));
    }
}
