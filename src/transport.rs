// src/transport.rs
//
// Tempo -> sample-domain step grid.

//
// ===============================
// MARK: Step-grid transport (RT-safe)
// ===============================
//

/// Tempo state expressed in the sample domain.
///
/// This struct:
/// - is real-time safe
/// - is copyable
/// - is re-resolved from parameters once per block
///
/// A step is a sixteenth note (a quarter of a beat) divided by `speed`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transport {
    /// Tempo (already clamped)
    pub bpm: f64,

    /// Sample rate (Hz)
    pub sample_rate: f64,

    /// Step-rate multiplier (1.0 = sixteenth notes)
    pub speed: f64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            sample_rate: 44_100.0,
            speed: 1.0,
        }
    }
}

impl Transport {
    pub fn new(sample_rate: f64, bpm: f64, speed: f64) -> Self {
        Self {
            bpm,
            sample_rate,
            speed,
        }
    }

    /// Unrounded step length in samples.
    #[inline]
    pub fn exact_step_samples(&self) -> f64 {
        60.0 / self.bpm * self.sample_rate / 4.0 / self.speed
    }

    /// Step length rounded to whole samples; the grid the clock runs on.
    #[inline]
    pub fn step_samples(&self) -> usize {
        self.exact_step_samples().round().max(1.0) as usize
    }

    /// Step length in seconds (used as envelope release time).
    #[inline]
    pub fn step_seconds(&self) -> f64 {
        self.step_samples() as f64 / self.sample_rate
    }

    /// Rounding error accumulated over one cycle on a grid of `step_samples`.
    ///
    /// Added to the cycle-end threshold so consecutive cycles stay locked to
    /// tempo even though each step is a whole number of samples.
    #[inline]
    pub fn cycle_drift(&self, cycle_length: usize, step_samples: usize) -> i64 {
        (cycle_length as f64 * (self.exact_step_samples() - step_samples as f64)).round() as i64
    }

    /// Frames needed to capture one full cycle, plus headroom.
    #[inline]
    pub fn capture_frames(&self, cycle_length: usize) -> usize {
        cycle_length * self.step_samples() + CAPTURE_HEADROOM
    }
}

/// Extra frames kept after a cycle's worth of capture.
pub const CAPTURE_HEADROOM: usize = 4096;
