// src/lib.rs
//
// Library entry point for Rust, FFI (iOS/Swift) and wasm consumers.

pub mod audio_buffer;
pub mod bridge;
pub mod capture;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod event;
pub mod isolator;
pub mod melody;
pub mod params;
pub mod phase_clock;
pub mod pitch;
pub mod resynth;
pub mod snapshot;
pub mod transport;

#[cfg(feature = "ios")]
pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use audio_buffer::{AudioBuffer, ChannelBuffer};
pub use bridge::{Command, ControlHandle, EngineHandle, Readback, create_bridge};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, ConfigResult};
pub use event::{CapturedMelody, GeneratedMelody, StepEvent};
pub use isolator::VoiceGrain;
pub use melody::Scale;
pub use params::{ParamId, ParamInfo, ParamSnapshot, ParamStore};
pub use phase_clock::ClockState;
pub use pitch::{freq_to_midi, midi_to_freq};
pub use snapshot::GrainSnapshot;
