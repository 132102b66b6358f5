// src/config.rs
//
// Engine construction settings.

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;
pub const DEFAULT_CHANNELS: usize = 2;
pub const DEFAULT_SPEED: f64 = 1.0;
pub const DEFAULT_SEED: u64 = 0x5eed_c0de;

/// Upper bound on channels per block.
pub const MAX_CHANNELS: usize = 8;

/// Fixed settings for one engine instance.
///
/// Everything the host can change while running lives in the parameter
/// store instead.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f64,

    /// Largest sub-block processed in one pass; bigger host blocks are split.
    pub max_block_size: usize,

    pub channels: usize,

    /// Step-rate multiplier (1.0 = sixteenth notes at the tempo).
    pub speed: f64,

    /// Seeds the melody generator and the splice jitter tables.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            channels: DEFAULT_CHANNELS,
            speed: DEFAULT_SPEED,
            seed: DEFAULT_SEED,
        }
    }
}

impl EngineConfig {
    pub fn new(sample_rate: f64, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
            ..Self::default()
        }
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.sample_rate > 0.0) || !self.sample_rate.is_finite() {
            return Err(ConfigError::InvalidSampleRate {
                sample_rate: self.sample_rate,
            });
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannelCount {
                channels: self.channels,
                max: MAX_CHANNELS,
            });
        }
        if self.max_block_size == 0 {
            return Err(ConfigError::InvalidBlockSize {
                max_block_size: self.max_block_size,
            });
        }
        if !(self.speed > 0.0) || !self.speed.is_finite() {
            return Err(ConfigError::InvalidSpeed { speed: self.speed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::new(0.0, 2).validate(),
            Err(ConfigError::InvalidSampleRate { .. })
        ));
        assert!(matches!(
            EngineConfig::new(f64::NAN, 2).validate(),
            Err(ConfigError::InvalidSampleRate { .. })
        ));
        assert!(matches!(
            EngineConfig::new(48_000.0, 0).validate(),
            Err(ConfigError::InvalidChannelCount { .. })
        ));
        assert!(matches!(
            EngineConfig::default().with_max_block_size(0).validate(),
            Err(ConfigError::InvalidBlockSize { .. })
        ));
        assert!(matches!(
            EngineConfig::default().with_speed(-1.0).validate(),
            Err(ConfigError::InvalidSpeed { .. })
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = EngineConfig::new(48_000.0, 12).validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid channel count 12 (expected 1..=8)");
    }
}
