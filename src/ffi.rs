// C-compatible FFI bindings for Swift/iOS integration.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - Caller must call the corresponding _destroy function for each _create
// - `countertune_process` must only be called from the audio thread

use crate::audio_buffer::AudioBuffer;
use crate::bridge::{ControlHandle, EngineHandle, Readback, create_bridge};
use crate::config::{
    DEFAULT_CHANNELS, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, DEFAULT_SEED, DEFAULT_SPEED,
    EngineConfig,
};
use crate::engine::Engine;
use crate::params::{ParamId, param_infos};
use crate::phase_clock::ClockState;

use log::{LevelFilter, error, info, warn};
use oslog::OsLogger;

// Logger subsystem identifier
const LOG_SUBSYSTEM: &str = "com.countertune.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup before using any other FFI functions.
/// Output appears in Console.app and Xcode's debug console.
#[unsafe(no_mangle)]
pub extern "C" fn countertune_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to the ControlHandle (UI-side).
pub struct CounterTuneControl {
    inner: ControlHandle,
}

/// Opaque handle to the EngineHandle (audio-side).
///
/// Carries planar scratch buffers so host channel pointers can be gathered
/// without allocating on the audio thread.
pub struct CounterTuneEngine {
    inner: EngineHandle,
    input: Vec<f32>,
    output: Vec<f32>,
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Types
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating an engine.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CounterTuneConfig {
    /// Sample rate in Hz (e.g., 44100.0, 48000.0).
    pub sample_rate: f64,
    /// Maximum audio block size in frames (e.g., 512, 1024).
    pub max_block_size: u32,
    /// Channels per block (1..=8).
    pub channels: u32,
    /// Step-rate multiplier.
    pub speed: f64,
    /// Seed for melody generation and splice jitter.
    pub seed: u64,
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

/// Readback data from the engine (for UI displays).
#[repr(C)]
pub struct CounterTuneReadback {
    /// Pitch class of the last transcribed note, -1 for none
    pub input_note: i32,
    /// Pitch class of the sounding counter-melody note, -1 for none
    pub output_note: i32,
    /// MIDI note of the current grain, -1 for none
    pub voice_note: i32,
    /// 0 = idle, 1 = armed, 2 = running
    pub clock_state: u32,
    pub cycles_completed: u64,
}

impl From<Readback> for CounterTuneReadback {
    fn from(r: Readback) -> Self {
        Self {
            input_note: r.input_note,
            output_note: r.output_note,
            voice_note: r.voice_note,
            clock_state: match r.clock_state {
                ClockState::Idle => 0,
                ClockState::Armed => 1,
                ClockState::Running => 2,
            },
            cycles_completed: r.cycles_completed,
        }
    }
}

/// Parameter info for UI controls.
#[repr(C)]
pub struct CounterTuneParamInfo {
    pub id: u32,
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    pub discrete: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Creation
// ═══════════════════════════════════════════════════════════════════════════

/// Get the default configuration values.
#[unsafe(no_mangle)]
pub extern "C" fn countertune_default_config() -> CounterTuneConfig {
    CounterTuneConfig::default()
}

/// Create a control and engine pair.
///
/// Returns the control handle; the engine handle is written to `out_engine`.
/// Returns NULL (and writes NULL) if the configuration is invalid.
///
/// # Safety
/// - `config` must be a valid pointer to a CounterTuneConfig or NULL for defaults
/// - `out_engine` must be a valid pointer to store the engine handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_create(
    config: *const CounterTuneConfig,
    out_engine: *mut *mut CounterTuneEngine,
) -> *mut CounterTuneControl {
    if out_engine.is_null() {
        warn!("countertune_create: out_engine is NULL");
        return std::ptr::null_mut();
    }

    let cfg = if config.is_null() {
        CounterTuneConfig::default()
    } else {
        unsafe { std::ptr::read(config) }
    };

    let engine = match Engine::new(cfg.into()) {
        Ok(engine) => engine,
        Err(err) => {
            error!("countertune_create: {}", err);
            unsafe { *out_engine = std::ptr::null_mut() };
            return std::ptr::null_mut();
        }
    };

    let scratch = engine.config().channels * engine.config().max_block_size;
    let (control, engine_handle) = create_bridge(engine);
    info!(
        "countertune_create: {} Hz, {} channels, block {}",
        cfg.sample_rate, cfg.channels, cfg.max_block_size
    );

    unsafe {
        *out_engine = Box::into_raw(Box::new(CounterTuneEngine {
            inner: engine_handle,
            input: vec![0.0; scratch],
            output: vec![0.0; scratch],
        }));
    }

    Box::into_raw(Box::new(CounterTuneControl { inner: control }))
}

/// Destroy a control handle.
///
/// # Safety
/// `control` must be a valid pointer returned by `countertune_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_control_destroy(control: *mut CounterTuneControl) {
    if !control.is_null() {
        unsafe { drop(Box::from_raw(control)) };
    }
}

/// Destroy an engine handle.
///
/// # Safety
/// `engine` must be a valid pointer returned via `countertune_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_engine_destroy(engine: *mut CounterTuneEngine) {
    if !engine.is_null() {
        unsafe { drop(Box::from_raw(engine)) };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Control - Parameters
// ═══════════════════════════════════════════════════════════════════════════

/// Number of parameters.
#[unsafe(no_mangle)]
pub extern "C" fn countertune_param_count() -> u32 {
    ParamId::COUNT as u32
}

/// Fill `out` with the metadata of parameter `index`.
///
/// Returns false for an unknown index.
///
/// # Safety
/// `out` must be a valid pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_param_info(index: u32, out: *mut CounterTuneParamInfo) -> bool {
    let Some(info) = param_infos().get(index as usize) else {
        return false;
    };
    if out.is_null() {
        return false;
    }
    unsafe {
        *out = CounterTuneParamInfo {
            id: info.id as u32,
            min_value: info.min,
            max_value: info.max,
            default_value: info.default,
            discrete: info.step > 0.0,
        };
    }
    true
}

/// Set a parameter value. Returns the clamped value that was stored, or NaN
/// for an unknown parameter.
///
/// # Safety
/// `control` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_set_param(
    control: *mut CounterTuneControl,
    param_id: u32,
    value: f32,
) -> f32 {
    if control.is_null() {
        return f32::NAN;
    }
    let Some(id) = ParamId::from_u32(param_id) else {
        warn!("countertune_set_param: unknown param_id={}", param_id);
        return f32::NAN;
    };
    unsafe { (*control).inner.set_param(id, value) }
}

/// Get a parameter value (NaN for an unknown parameter).
///
/// # Safety
/// `control` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_get_param(
    control: *const CounterTuneControl,
    param_id: u32,
) -> f32 {
    if control.is_null() {
        return f32::NAN;
    }
    match ParamId::from_u32(param_id) {
        Some(id) => unsafe { (*control).inner.param(id) },
        None => f32::NAN,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Control - Transport and Readback
// ═══════════════════════════════════════════════════════════════════════════

/// Ask the engine to return to Idle.
///
/// # Safety
/// `control` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_stop(control: *mut CounterTuneControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.stop() };
}

/// Ask the engine to forget all state.
///
/// # Safety
/// `control` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_reset(control: *mut CounterTuneControl) {
    if control.is_null() {
        return;
    }
    unsafe { (*control).inner.reset() };
}

/// Get the current engine readback state.
///
/// # Safety
/// `control` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_readback(
    control: *const CounterTuneControl,
) -> CounterTuneReadback {
    if control.is_null() {
        return CounterTuneReadback {
            input_note: -1,
            output_note: -1,
            voice_note: -1,
            clock_state: 0,
            cycles_completed: 0,
        };
    }
    unsafe { (*control).inner.readback().into() }
}

/// Copy one channel of the grain display snapshot into `dst`.
///
/// Returns the number of samples written (at most `capacity`). Passing a
/// NULL `dst` returns the snapshot length without copying.
///
/// # Safety
/// - `control` must be valid
/// - `dst` must have room for `capacity` floats or be NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_copy_snapshot(
    control: *const CounterTuneControl,
    channel: u32,
    dst: *mut f32,
    capacity: u32,
) -> u32 {
    if control.is_null() {
        return 0;
    }
    let snapshot = unsafe { (*control).inner.snapshot() };
    if dst.is_null() {
        return snapshot.frames as u32;
    }
    if snapshot.is_empty() || channel as usize >= snapshot.channels {
        return 0;
    }
    let src = snapshot.channel(channel as usize);
    let count = src.len().min(capacity as usize);
    let out = unsafe { std::slice::from_raw_parts_mut(dst, count) };
    out.copy_from_slice(&src[..count]);
    count as u32
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine - Audio Thread
// ═══════════════════════════════════════════════════════════════════════════

/// Process one host block.
///
/// `inputs` and `outputs` are arrays of `channels` channel pointers, each
/// with room for `frames` floats. Input and output may alias. A host with
/// fewer channels than the engine has its first channel duplicated on input;
/// host channels beyond the engine's count are silenced on output.
///
/// # Safety
/// - Must be called from the audio thread
/// - All channel pointers must be valid for `frames` floats
#[unsafe(no_mangle)]
pub unsafe extern "C" fn countertune_process(
    engine: *mut CounterTuneEngine,
    inputs: *const *const f32,
    outputs: *const *mut f32,
    channels: u32,
    frames: u32,
) {
    let host_channels = channels as usize;
    let total_frames = frames as usize;
    if outputs.is_null() || host_channels == 0 {
        return;
    }
    let outputs = unsafe { std::slice::from_raw_parts(outputs, host_channels) };

    if engine.is_null() || inputs.is_null() {
        for &out in outputs {
            if !out.is_null() {
                unsafe { std::ptr::write_bytes(out, 0, total_frames) };
            }
        }
        return;
    }

    let wrapper = unsafe { &mut *engine };
    let inputs = unsafe { std::slice::from_raw_parts(inputs, host_channels) };
    let engine_channels = wrapper.inner.engine().config().channels;
    let max_block = wrapper.inner.engine().config().max_block_size;

    // Gather, process, scatter in chunks of max_block
    let mut offset = 0;
    while offset < total_frames {
        let chunk = (total_frames - offset).min(max_block);
        let len = engine_channels * chunk;

        for ch in 0..engine_channels {
            let src = inputs[ch.min(host_channels - 1)];
            let dst = &mut wrapper.input[ch * chunk..(ch + 1) * chunk];
            if src.is_null() {
                dst.fill(0.0);
            } else {
                let src = unsafe { std::slice::from_raw_parts(src.add(offset), chunk) };
                dst.copy_from_slice(src);
            }
        }

        let input = AudioBuffer::new(&mut wrapper.input[..len], engine_channels);
        let mut output = AudioBuffer::new(&mut wrapper.output[..len], engine_channels);
        wrapper.inner.process(&input, &mut output);

        for (ch, &out) in outputs.iter().enumerate() {
            if out.is_null() {
                continue;
            }
            let dst = unsafe { std::slice::from_raw_parts_mut(out.add(offset), chunk) };
            if ch < engine_channels {
                dst.copy_from_slice(output.channel(ch));
            } else {
                dst.fill(0.0);
            }
        }
        offset += chunk;
    }
}
