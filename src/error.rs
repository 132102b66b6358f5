// src/error.rs
//
// Errors raised while setting an engine up. The audio path itself never
// fails; it degrades instead.

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sample rate is not a positive, finite number.
    InvalidSampleRate { sample_rate: f64 },

    /// Channel count outside the supported range.
    InvalidChannelCount { channels: usize, max: usize },

    /// Maximum block size of zero.
    InvalidBlockSize { max_block_size: usize },

    /// Playback speed is not a positive, finite number.
    InvalidSpeed { speed: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidSampleRate { sample_rate } => {
                write!(f, "Invalid sample rate {}", sample_rate)
            }
            ConfigError::InvalidChannelCount { channels, max } => {
                write!(f, "Invalid channel count {} (expected 1..={})", channels, max)
            }
            ConfigError::InvalidBlockSize { max_block_size } => {
                write!(f, "Invalid maximum block size {}", max_block_size)
            }
            ConfigError::InvalidSpeed { speed } => {
                write!(f, "Invalid speed {}", speed)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Result of engine construction.
pub type ConfigResult<T> = Result<T, ConfigError>;
