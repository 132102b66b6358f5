// src/params.rs
//
// Effect parameters: metadata for hosts/UI, a lock-free store written by
// the control thread, and the typed per-block snapshot the engine reads.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::melody::Scale;

/// Display curve for parameter UI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DisplayCurve {
    /// Linear mapping
    #[default]
    Linear,
    /// Symmetric around zero (good for pitch offsets)
    Symmetric,
}

/// Unit type for parameter display.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ParamUnit {
    #[default]
    None,
    /// Percentage (0-100)
    Percent,
    /// Beats per minute
    Bpm,
    /// Sequencer steps
    Steps,
    /// Semitones
    Semitones,
    /// Octaves
    Octaves,
}

impl fmt::Display for ParamUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamUnit::None => Ok(()),
            ParamUnit::Percent => write!(f, "%"),
            ParamUnit::Bpm => write!(f, "BPM"),
            ParamUnit::Steps => write!(f, "steps"),
            ParamUnit::Semitones => write!(f, "st"),
            ParamUnit::Octaves => write!(f, "oct"),
        }
    }
}

/// Every automatable parameter of the effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ParamId {
    Mix = 0,
    Tempo = 1,
    CycleLength = 2,
    Density = 3,
    Key = 4,
    Scale = 5,
    Octave = 6,
    Detune = 7,
}

impl ParamId {
    pub const COUNT: usize = 8;

    pub const ALL: [ParamId; Self::COUNT] = [
        ParamId::Mix,
        ParamId::Tempo,
        ParamId::CycleLength,
        ParamId::Density,
        ParamId::Key,
        ParamId::Scale,
        ParamId::Octave,
        ParamId::Detune,
    ];

    /// Look up a parameter by its numeric id (as used across FFI).
    pub fn from_u32(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Look up a parameter by its host-facing name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.info().name == name)
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn info(self) -> &'static ParamInfo {
        &PARAM_INFOS[self.index()]
    }
}

/// Metadata describing a parameter.
///
/// Used by hosts and UIs to:
/// - Display appropriate controls
/// - Validate input ranges
/// - Format values for display
#[derive(Debug, Clone, Copy)]
pub struct ParamInfo {
    pub id: ParamId,

    /// Host-facing name
    pub name: &'static str,

    pub min: f32,
    pub max: f32,
    pub default: f32,

    pub unit: ParamUnit,
    pub curve: DisplayCurve,

    /// Step size for discrete parameters (0 = continuous)
    pub step: f32,
}

impl ParamInfo {
    pub const fn new(id: ParamId, name: &'static str) -> Self {
        Self {
            id,
            name,
            min: 0.0,
            max: 1.0,
            default: 0.0,
            unit: ParamUnit::None,
            curve: DisplayCurve::Linear,
            step: 0.0,
        }
    }

    pub const fn range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub const fn default(mut self, value: f32) -> Self {
        self.default = value;
        self
    }

    pub const fn unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    pub const fn curve(mut self, curve: DisplayCurve) -> Self {
        self.curve = curve;
        self
    }

    pub const fn discrete(mut self) -> Self {
        self.step = 1.0;
        self
    }

    /// Clamp a value to the valid range, snapping discrete parameters.
    ///
    /// Non-finite input falls back to the default.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.default;
        }
        let value = value.clamp(self.min, self.max);
        if self.step > 0.0 { value.round() } else { value }
    }

    /// Format a value for display.
    pub fn format(&self, value: f32) -> String {
        let precision = if self.step > 0.0 { 0 } else { 2 };
        if self.unit == ParamUnit::None {
            format!("{:.prec$}", value, prec = precision)
        } else {
            format!("{:.prec$} {}", value, self.unit, prec = precision)
        }
    }
}

static PARAM_INFOS: [ParamInfo; ParamId::COUNT] = [
    ParamInfo::new(ParamId::Mix, "mix")
        .range(0.0, 1.0)
        .default(0.5)
        .unit(ParamUnit::Percent),
    ParamInfo::new(ParamId::Tempo, "tempo")
        .range(60.0, 240.0)
        .default(120.0)
        .unit(ParamUnit::Bpm),
    ParamInfo::new(ParamId::CycleLength, "period")
        .range(1.0, 32.0)
        .default(16.0)
        .unit(ParamUnit::Steps)
        .discrete(),
    ParamInfo::new(ParamId::Density, "density")
        .range(1.0, 6.0)
        .default(4.0)
        .discrete(),
    ParamInfo::new(ParamId::Key, "key")
        .range(0.0, 11.0)
        .default(0.0)
        .unit(ParamUnit::Semitones)
        .discrete(),
    ParamInfo::new(ParamId::Scale, "scale")
        .range(1.0, 4.0)
        .default(1.0)
        .discrete(),
    ParamInfo::new(ParamId::Octave, "octave")
        .range(-4.0, 4.0)
        .default(0.0)
        .unit(ParamUnit::Octaves)
        .curve(DisplayCurve::Symmetric)
        .discrete(),
    ParamInfo::new(ParamId::Detune, "detune")
        .range(-1.0, 1.0)
        .default(0.0)
        .unit(ParamUnit::Semitones)
        .curve(DisplayCurve::Symmetric),
];

/// All parameter descriptors, in id order.
pub fn param_infos() -> &'static [ParamInfo] {
    &PARAM_INFOS
}

// ═══════════════════════════════════════════════════════════════════
// Parameter store (control thread -> audio thread)
// ═══════════════════════════════════════════════════════════════════

/// Lock-free parameter storage.
///
/// Values are stored as f32 bits (no AtomicF32 in std) and clamped on the
/// way in, so the audio thread never sees an out-of-range value.
#[derive(Debug)]
pub struct ParamStore {
    values: [AtomicU32; ParamId::COUNT],
}

impl ParamStore {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|i| AtomicU32::new(PARAM_INFOS[i].default.to_bits())),
        }
    }

    /// Store a value, clamped to the parameter's range. Returns what was stored.
    pub fn set(&self, id: ParamId, value: f32) -> f32 {
        let clamped = id.info().clamp(value);
        self.values[id.index()].store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        f32::from_bits(self.values[id.index()].load(Ordering::Relaxed))
    }

    /// Read every parameter once for the coming block.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot::from_fn(|id| self.get(id))
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Per-block snapshot
// ═══════════════════════════════════════════════════════════════════

/// Typed, immutable parameter values for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    /// Wet fraction, 0..=1
    pub mix: f32,
    /// Tempo in BPM
    pub tempo: f64,
    /// Steps per cycle, 1..=32
    pub cycle_length: usize,
    /// Density selector, 1..=6
    pub density: u8,
    /// Semitone offset from C, 0..=11
    pub key: u8,
    pub scale: Scale,
    /// Octave shift, -4..=4
    pub octave: i8,
    /// Detune in semitones, -1..=1
    pub detune: f32,
}

impl ParamSnapshot {
    /// Build a snapshot from raw values, clamping each one.
    pub fn from_fn(mut raw: impl FnMut(ParamId) -> f32) -> Self {
        let mut value = |id: ParamId| id.info().clamp(raw(id));
        Self {
            mix: value(ParamId::Mix),
            tempo: value(ParamId::Tempo) as f64,
            cycle_length: value(ParamId::CycleLength) as usize,
            density: value(ParamId::Density) as u8,
            key: value(ParamId::Key) as u8,
            scale: Scale::from_selector(value(ParamId::Scale) as u8),
            octave: value(ParamId::Octave) as i8,
            detune: value(ParamId::Detune),
        }
    }

    /// Copy of this snapshot with one parameter replaced (and clamped).
    pub fn with(self, id: ParamId, value: f32) -> Self {
        Self::from_fn(|p| if p == id { value } else { self.raw(p) })
    }

    /// The snapshot value of `id` as a plain float.
    pub fn raw(&self, id: ParamId) -> f32 {
        match id {
            ParamId::Mix => self.mix,
            ParamId::Tempo => self.tempo as f32,
            ParamId::CycleLength => self.cycle_length as f32,
            ParamId::Density => self.density as f32,
            ParamId::Key => self.key as f32,
            ParamId::Scale => self.scale.selector() as f32,
            ParamId::Octave => self.octave as f32,
            ParamId::Detune => self.detune,
        }
    }
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        Self::from_fn(|id| id.info().default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_clamps_at_boundary() {
        let store = ParamStore::new();
        assert_eq!(store.set(ParamId::Tempo, 400.0), 240.0);
        assert_eq!(store.set(ParamId::Octave, -9.0), -4.0);
        assert_eq!(store.set(ParamId::Density, 2.6), 3.0);
        assert_eq!(store.set(ParamId::Mix, f32::NAN), 0.5);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.tempo, 240.0);
        assert_eq!(snapshot.octave, -4);
        assert_eq!(snapshot.density, 3);
    }

    #[test]
    fn test_ids_round_trip() {
        for id in ParamId::ALL {
            assert_eq!(ParamId::from_u32(id as u32), Some(id));
            assert_eq!(ParamId::from_name(id.info().name), Some(id));
        }
        assert_eq!(ParamId::from_u32(99), None);
        assert_eq!(ParamId::from_name("period"), Some(ParamId::CycleLength));
    }

    #[test]
    fn test_snapshot_with_overrides_single_value() {
        let snapshot = ParamSnapshot::default()
            .with(ParamId::Scale, 3.0)
            .with(ParamId::Key, 14.0);
        assert_eq!(snapshot.scale, Scale::Pentatonic);
        assert_eq!(snapshot.key, 11);
        assert_eq!(snapshot.tempo, 120.0);
    }

    #[test]
    fn test_format() {
        assert_eq!(ParamId::Tempo.info().format(120.0), "120.00 BPM");
        assert_eq!(ParamId::Density.info().format(4.0), "4");
    }
}
