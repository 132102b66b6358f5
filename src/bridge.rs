//! Thread-safe bridge between UI and audio engine.
//!
//! This module provides the communication layer that allows the UI thread
//! to safely interact with the real-time audio engine.
//!
//! # Architecture
//!
//! - **UI thread** owns [`ControlHandle`]: parameters, readback, grain snapshot
//! - **Audio thread** owns [`EngineHandle`] with the [`Engine`]
//! - Parameters live in a shared lock-free [`ParamStore`]
//! - Commands travel over an MPSC channel; readback uses atomics; the grain
//!   display goes through a [`SnapshotHandoff`] double buffer
//!
//! # Usage
//!
//! ```ignore
//! let (control, mut audio) = create_bridge(Engine::new(EngineConfig::default())?);
//!
//! // UI thread
//! control.set_param(ParamId::Density, 5.0);
//! let notes = control.readback();
//!
//! // Audio thread
//! audio.process(&input, &mut output);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicI32, AtomicU8, AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender},
};

use crate::audio_buffer::AudioBuffer;
use crate::engine::Engine;
use crate::isolator::MAX_GRAIN_FRAMES;
use crate::params::{ParamId, ParamStore};
use crate::phase_clock::ClockState;
use crate::snapshot::{GrainSnapshot, SnapshotHandoff};

/// Control messages for the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Return to Idle; the sounding grain fades out.
    Stop,

    /// Full reset (host transport reset).
    Reset,
}

/// Engine state as seen from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readback {
    /// Pitch class of the last transcribed note, -1 for none
    pub input_note: i32,

    /// Pitch class of the note sounding mid-step, -1 for none
    pub output_note: i32,

    /// MIDI note of the current grain, -1 before the first grain
    pub voice_note: i32,

    pub clock_state: ClockState,
    pub cycles_completed: u64,
}

/// Handle for the UI thread to communicate with the engine.
///
/// All methods are safe to call from the main thread.
pub struct ControlHandle {
    params: Arc<ParamStore>,

    /// Channel to send commands to the engine.
    command_tx: Sender<Command>,

    /// Shared readback state (updated by engine, read by UI).
    readback: Arc<SharedReadback>,

    snapshot: Arc<SnapshotHandoff>,
}

/// Handle for the audio thread containing the engine and communication channels.
pub struct EngineHandle {
    /// The audio engine (owned by audio thread).
    engine: Engine,

    params: Arc<ParamStore>,

    /// Channel to receive commands from UI.
    command_rx: Receiver<Command>,

    /// Shared readback state (written by engine).
    readback: Arc<SharedReadback>,

    snapshot: Arc<SnapshotHandoff>,

    /// Grain serial last written to the snapshot
    published_grain: u64,
}

/// Lock-free shared state for engine -> UI readback.
struct SharedReadback {
    input_note: AtomicI32,
    output_note: AtomicI32,
    voice_note: AtomicI32,
    clock_state: AtomicU8,
    cycles_completed: AtomicU64,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            input_note: AtomicI32::new(-1),
            output_note: AtomicI32::new(-1),
            voice_note: AtomicI32::new(-1),
            clock_state: AtomicU8::new(encode_state(ClockState::Idle)),
            cycles_completed: AtomicU64::new(0),
        }
    }
}

fn encode_state(state: ClockState) -> u8 {
    match state {
        ClockState::Idle => 0,
        ClockState::Armed => 1,
        ClockState::Running => 2,
    }
}

fn decode_state(value: u8) -> ClockState {
    match value {
        1 => ClockState::Armed,
        2 => ClockState::Running,
        _ => ClockState::Idle,
    }
}

/// Pitch class for display, -1 for none.
#[inline]
fn pitch_class(note: Option<u8>) -> i32 {
    note.map_or(-1, |n| (n % 12) as i32)
}

/// Create a linked pair of handles for UI and Engine communication.
///
/// The `engine` is owned by the `EngineHandle` and runs on the audio thread.
pub fn create_bridge(engine: Engine) -> (ControlHandle, EngineHandle) {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let params = Arc::new(ParamStore::new());
    let readback = Arc::new(SharedReadback::new());
    let snapshot = Arc::new(SnapshotHandoff::new(
        engine.config().channels,
        MAX_GRAIN_FRAMES,
    ));

    let control = ControlHandle {
        params: Arc::clone(&params),
        command_tx: cmd_tx,
        readback: Arc::clone(&readback),
        snapshot: Arc::clone(&snapshot),
    };

    let engine_handle = EngineHandle {
        published_grain: engine.grain_serial(),
        engine,
        params,
        command_rx: cmd_rx,
        readback,
        snapshot,
    };

    (control, engine_handle)
}

// ═══════════════════════════════════════════════════════════════════
// ControlHandle - UI Thread API
// ═══════════════════════════════════════════════════════════════════

impl ControlHandle {
    /// Set a parameter; the value is clamped. Returns what was stored.
    pub fn set_param(&self, id: ParamId, value: f32) -> f32 {
        self.params.set(id, value)
    }

    pub fn param(&self, id: ParamId) -> f32 {
        self.params.get(id)
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    /// Get the current engine readback state.
    pub fn readback(&self) -> Readback {
        Readback {
            input_note: self.readback.input_note.load(Ordering::Relaxed),
            output_note: self.readback.output_note.load(Ordering::Relaxed),
            voice_note: self.readback.voice_note.load(Ordering::Relaxed),
            clock_state: decode_state(self.readback.clock_state.load(Ordering::Relaxed)),
            cycles_completed: self.readback.cycles_completed.load(Ordering::Relaxed),
        }
    }

    /// Copy of the most recently isolated grain, normalized.
    pub fn snapshot(&self) -> GrainSnapshot {
        self.snapshot.read()
    }

    pub fn stop(&self) {
        let _ = self.command_tx.send(Command::Stop);
    }

    pub fn reset(&self) {
        let _ = self.command_tx.send(Command::Reset);
    }
}

// ═══════════════════════════════════════════════════════════════════
// EngineHandle - Audio Thread API
// ═══════════════════════════════════════════════════════════════════

impl EngineHandle {
    /// Process all pending commands from the UI.
    ///
    /// Called at the start of each audio block.
    pub fn process_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                Command::Stop => self.engine.stop(),
                Command::Reset => self.engine.reset(),
            }
        }
    }

    /// Run one host block: commands, parameters, engine, readback.
    ///
    /// Call this once per audio callback.
    pub fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer) {
        self.process_commands();
        let params = self.params.snapshot();
        self.engine.process(input, output, &params);
        self.publish();
    }

    fn publish(&mut self) {
        let engine = &self.engine;
        let readback = &self.readback;
        readback
            .input_note
            .store(pitch_class(engine.input_note()), Ordering::Relaxed);
        readback
            .output_note
            .store(pitch_class(engine.output_note()), Ordering::Relaxed);
        readback.voice_note.store(
            engine.voice_note().map_or(-1, |n| n as i32),
            Ordering::Relaxed,
        );
        readback
            .clock_state
            .store(encode_state(engine.clock_state()), Ordering::Relaxed);
        readback
            .cycles_completed
            .store(engine.cycles_completed(), Ordering::Relaxed);

        if engine.grain_serial() != self.published_grain {
            self.snapshot.publish(&engine.voice_grain().buffer);
            self.published_grain = engine.grain_serial();
        }
    }

    /// Get a reference to the engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get a mutable reference to the engine.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    const SR: f64 = 44_100.0;

    fn bridge() -> (ControlHandle, EngineHandle) {
        create_bridge(Engine::new(EngineConfig::new(SR, 1).with_seed(4)).unwrap())
    }

    fn tone(offset: usize, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = (offset + i) as f64 / SR;
                ((std::f64::consts::TAU * 440.0 * t).sin() * 0.5) as f32
            })
            .collect()
    }

    fn run(audio: &mut EngineHandle, offset: usize) {
        let mut data = tone(offset, 512);
        let mut out = vec![0.0; 512];
        let input = AudioBuffer::new(&mut data, 1);
        let mut output = AudioBuffer::new(&mut out, 1);
        audio.process(&input, &mut output);
    }

    #[test]
    fn test_params_are_clamped_and_shared() {
        let (control, _audio) = bridge();
        assert_eq!(control.set_param(ParamId::Density, 9.0), 6.0);
        assert_eq!(control.param(ParamId::Density), 6.0);
        assert_eq!(control.set_param(ParamId::Tempo, 20.0), 60.0);
    }

    #[test]
    fn test_initial_readback() {
        let (control, _audio) = bridge();
        let readback = control.readback();
        assert_eq!(readback.input_note, -1);
        assert_eq!(readback.voice_note, -1);
        assert_eq!(readback.clock_state, ClockState::Idle);
        assert!(control.snapshot().is_empty());
    }

    #[test]
    fn test_cycle_publishes_notes_and_snapshot() {
        let (control, mut audio) = bridge();
        control.set_param(ParamId::CycleLength, 6.0);

        let mut offset = 0;
        while control.readback().cycles_completed == 0 {
            run(&mut audio, offset);
            offset += 512;
            assert!(offset < 500_000);
        }

        let readback = control.readback();
        assert_eq!(readback.input_note, 9);
        assert_eq!(readback.voice_note, 69);
        assert_eq!(readback.clock_state, ClockState::Running);

        let snapshot = control.snapshot();
        assert_eq!(snapshot.frames, MAX_GRAIN_FRAMES);
        let peak = snapshot.samples.iter().fold(0.0_f32, |p, s| p.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stop_command_reaches_engine() {
        let (control, mut audio) = bridge();
        let mut offset = 0;
        while control.readback().clock_state == ClockState::Idle {
            run(&mut audio, offset);
            offset += 512;
            assert!(offset < 50_000);
        }
        control.stop();
        let mut silence = vec![0.0; 512];
        let mut out = vec![0.0; 512];
        audio.process(
            &AudioBuffer::new(&mut silence, 1),
            &mut AudioBuffer::new(&mut out, 1),
        );
        assert_eq!(control.readback().clock_state, ClockState::Idle);
        assert_eq!(audio.engine().clock_state(), ClockState::Idle);
    }
}
