//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { countertune_init, CounterTune, CounterTuneConfig } from './countertune.js';
//!
//! await init();
//! countertune_init();
//!
//! const config = new CounterTuneConfig();
//! config.sample_rate = sampleRate;
//! const effect = new CounterTune(config);
//! effect.set_param(PARAM_DENSITY, 5);
//!
//! // Inside the AudioWorklet: planar [ch0..., ch1...] blocks
//! effect.process(input, output);
//! ```

use wasm_bindgen::prelude::*;

use crate::audio_buffer::AudioBuffer;
use crate::bridge::{ControlHandle, EngineHandle, create_bridge};
use crate::config::{
    DEFAULT_CHANNELS, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, DEFAULT_SEED, DEFAULT_SPEED,
    EngineConfig,
};
use crate::engine::Engine;
use crate::params::ParamId;
use crate::phase_clock::ClockState;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn countertune_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating the effect.
#[wasm_bindgen]
#[derive(Clone, Copy)]
pub struct CounterTuneConfig {
    /// Sample rate in Hz (e.g., 44100.0, 48000.0).
    pub sample_rate: f64,
    /// Maximum audio block size in frames (e.g., 128, 256, 512).
    pub max_block_size: u32,
    /// Channels per block.
    pub channels: u32,
    /// Step-rate multiplier.
    pub speed: f64,
    pub seed: u64,
}

#[wasm_bindgen]
impl CounterTuneConfig {
    /// Create a new configuration with default values.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for CounterTuneConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE as u32,
            channels: DEFAULT_CHANNELS as u32,
            speed: DEFAULT_SPEED,
            seed: DEFAULT_SEED,
        }
    }
}

impl From<CounterTuneConfig> for EngineConfig {
    fn from(c: CounterTuneConfig) -> Self {
        EngineConfig {
            sample_rate: c.sample_rate,
            max_block_size: c.max_block_size as usize,
            channels: c.channels as usize,
            speed: c.speed,
            seed: c.seed,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Effect
// ═══════════════════════════════════════════════════════════════════════════

/// The effect as seen from an AudioWorklet.
///
/// A worklet runs control and audio on the same thread, so one object holds
/// both ends of the bridge.
#[wasm_bindgen]
pub struct CounterTune {
    control: ControlHandle,
    engine: EngineHandle,
    input: Vec<f32>,
    output: Vec<f32>,
}

#[wasm_bindgen]
impl CounterTune {
    #[wasm_bindgen(constructor)]
    pub fn new(config: CounterTuneConfig) -> Result<CounterTune, JsError> {
        let engine = Engine::new(config.into()).map_err(|err| JsError::new(&err.to_string()))?;
        let scratch = engine.config().channels * engine.config().max_block_size;
        let (control, engine) = create_bridge(engine);
        log::info!(
            "CounterTune created: {} Hz, {} channels",
            config.sample_rate,
            config.channels
        );
        Ok(CounterTune {
            control,
            engine,
            input: vec![0.0; scratch],
            output: vec![0.0; scratch],
        })
    }

    /// Set a parameter by numeric id. Returns the stored (clamped) value,
    /// NaN for an unknown id.
    pub fn set_param(&self, param_id: u32, value: f32) -> f32 {
        match ParamId::from_u32(param_id) {
            Some(id) => self.control.set_param(id, value),
            None => {
                log::warn!("set_param: unknown param_id={}", param_id);
                f32::NAN
            }
        }
    }

    /// Set a parameter by host-facing name (e.g. "density").
    pub fn set_param_by_name(&self, name: &str, value: f32) -> f32 {
        match ParamId::from_name(name) {
            Some(id) => self.control.set_param(id, value),
            None => f32::NAN,
        }
    }

    pub fn get_param(&self, param_id: u32) -> f32 {
        ParamId::from_u32(param_id).map_or(f32::NAN, |id| self.control.param(id))
    }

    /// Process one planar block.
    ///
    /// `input` and `output` hold `channels` runs of equal length. Blocks
    /// longer than `max_block_size` are processed in chunks.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let channels = self.engine.engine().config().channels;
        let max_block = self.engine.engine().config().max_block_size;
        let total_frames = (input.len() / channels).min(output.len() / channels);
        output[total_frames * channels..].fill(0.0);

        let mut offset = 0;
        while offset < total_frames {
            let chunk = (total_frames - offset).min(max_block);
            let len = channels * chunk;

            for ch in 0..channels {
                let start = ch * total_frames + offset;
                self.input[ch * chunk..(ch + 1) * chunk]
                    .copy_from_slice(&input[start..start + chunk]);
            }

            let input_block = AudioBuffer::new(&mut self.input[..len], channels);
            let mut output_block = AudioBuffer::new(&mut self.output[..len], channels);
            self.engine.process(&input_block, &mut output_block);

            for ch in 0..channels {
                let start = ch * total_frames + offset;
                output[start..start + chunk].copy_from_slice(output_block.channel(ch));
            }
            offset += chunk;
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Readback
    // ─────────────────────────────────────────────────────────────────────

    /// Pitch class of the last transcribed note, -1 for none.
    pub fn input_note(&self) -> i32 {
        self.control.readback().input_note
    }

    /// Pitch class of the counter-melody note sounding now, -1 for none.
    pub fn output_note(&self) -> i32 {
        self.control.readback().output_note
    }

    /// MIDI note of the current grain, -1 before the first grain.
    pub fn voice_note(&self) -> i32 {
        self.control.readback().voice_note
    }

    /// 0 = idle, 1 = armed, 2 = running
    pub fn clock_state(&self) -> u32 {
        match self.control.readback().clock_state {
            ClockState::Idle => 0,
            ClockState::Armed => 1,
            ClockState::Running => 2,
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.control.readback().cycles_completed
    }

    /// One channel of the isolated grain for waveform display.
    pub fn snapshot(&self, channel: u32) -> Vec<f32> {
        let snapshot = self.control.snapshot();
        if snapshot.is_empty() || channel as usize >= snapshot.channels {
            return Vec::new();
        }
        snapshot.channel(channel as usize).to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn reset(&self) {
        self.control.reset();
    }
}
