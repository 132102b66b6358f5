// src/pitch.rs
//
// Windowed fundamental-frequency estimation.
//
// Input arrives in host-sized blocks; the detector slices it into fixed
// 1024-sample windows and runs a time-domain estimator on each full window.
// The estimator is a normalized square difference function (autocorrelation
// normalized by window energy) with McLeod-style key-maximum picking and
// parabolic peak interpolation. It assumes a 44.1 kHz input; results are
// rescaled to the host rate afterwards.

/// Samples per analysis window.
pub const ANALYSIS_WINDOW: usize = 1024;

/// Sample rate the estimator's lag range is tuned for.
const REFERENCE_RATE: f64 = 44_100.0;

/// Largest lag searched (~86 Hz at the reference rate).
const MAX_LAG: usize = ANALYSIS_WINDOW / 2;

/// Smallest lag accepted (~2.2 kHz at the reference rate).
const MIN_LAG: usize = 20;

/// Windows with less mean-square energy than this are treated as silence.
const SILENCE_FLOOR: f32 = 1e-6;

/// Fraction of the global NSDF maximum a key maximum must reach to be picked.
const KEY_MAXIMUM_RATIO: f32 = 0.9;

/// Minimum NSDF peak value for a window to count as pitched.
const CLARITY_THRESHOLD: f32 = 0.6;

/// Convert a frequency to the nearest MIDI note.
///
/// Returns `None` for non-positive, non-finite, or out-of-range input.
#[inline]
pub fn freq_to_midi(freq: f64) -> Option<u8> {
    if !(freq > 0.0) || !freq.is_finite() {
        return None;
    }
    let note = (12.0 * (freq / 440.0).log2() + 69.0).round();
    (0.0..=127.0).contains(&note).then_some(note as u8)
}

/// Frequency of a MIDI note in Hz.
#[inline]
pub fn midi_to_freq(note: u8) -> f64 {
    440.0 * 2.0_f64.powf((note as f64 - 69.0) / 12.0)
}

/// Block-to-window pitch detector.
pub struct PitchDetector {
    window: Vec<f32>,
    fill: usize,

    /// NSDF scratch, one value per lag in `0..=MAX_LAG`
    nsdf: Vec<f32>,

    /// hostSampleRate / REFERENCE_RATE
    rate_scale: f64,
}

impl PitchDetector {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            window: vec![0.0; ANALYSIS_WINDOW],
            fill: 0,
            nsdf: vec![0.0; MAX_LAG + 1],
            rate_scale: sample_rate / REFERENCE_RATE,
        }
    }

    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.fill = 0;
    }

    /// Feed one block of mono samples.
    ///
    /// Calls `on_window` with the estimate (Hz, 0.0 = no pitch) for every
    /// window completed by this block. Samples past the end of a window are
    /// carried into the next one.
    pub fn process(&mut self, mono: &[f32], mut on_window: impl FnMut(f64)) {
        let mut input = mono;
        while !input.is_empty() {
            let take = (ANALYSIS_WINDOW - self.fill).min(input.len());
            self.window[self.fill..self.fill + take].copy_from_slice(&input[..take]);
            self.fill += take;
            input = &input[take..];

            if self.fill == ANALYSIS_WINDOW {
                let freq = self.estimate() * self.rate_scale;
                self.fill = 0;
                on_window(freq);
            }
        }
    }

    /// Estimate the fundamental of the full window at the reference rate.
    fn estimate(&mut self) -> f64 {
        let window = &self.window;
        let energy: f32 = window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32;
        if energy < SILENCE_FLOOR {
            return 0.0;
        }

        for (lag, out) in self.nsdf.iter_mut().enumerate() {
            let mut acf = 0.0_f32;
            let mut m = 0.0_f32;
            for i in 0..ANALYSIS_WINDOW - lag {
                let a = window[i];
                let b = window[i + lag];
                acf += a * b;
                m += a * a + b * b;
            }
            *out = if m > 0.0 { 2.0 * acf / m } else { 0.0 };
        }

        let Some(lag) = pick_key_maximum(&self.nsdf) else {
            return 0.0;
        };
        if lag < MIN_LAG as f32 {
            return 0.0;
        }
        REFERENCE_RATE / lag as f64
    }
}

/// Pick the first positive-lobe maximum that is close to the global maximum.
///
/// Skips the zero-lag lobe, then looks at each region where the NSDF is
/// positive. Returns the interpolated lag, or `None` for unpitched input.
fn pick_key_maximum(nsdf: &[f32]) -> Option<f32> {
    let mut global_max = 0.0_f32;
    for_each_lobe_peak(nsdf, |_, value| global_max = global_max.max(value));
    if global_max < CLARITY_THRESHOLD {
        return None;
    }

    let threshold = global_max * KEY_MAXIMUM_RATIO;
    let mut chosen = None;
    for_each_lobe_peak(nsdf, |lag, value| {
        if chosen.is_none() && value >= threshold {
            chosen = Some(lag);
        }
    });

    chosen.map(|lag| parabolic_peak(nsdf, lag))
}

/// Visit the maximum of every positive lobe after the first zero crossing.
fn for_each_lobe_peak(nsdf: &[f32], mut visit: impl FnMut(usize, f32)) {
    let Some(first_negative) = nsdf.iter().position(|&v| v < 0.0) else {
        return;
    };

    let mut lobe_peak: Option<(usize, f32)> = None;
    for (lag, &value) in nsdf.iter().enumerate().skip(first_negative) {
        if value > 0.0 {
            match lobe_peak {
                Some((_, peak)) if peak >= value => {}
                _ => lobe_peak = Some((lag, value)),
            }
        } else if let Some((peak_lag, peak)) = lobe_peak.take() {
            visit(peak_lag, peak);
        }
    }
    // A lobe still rising at MAX_LAG has no confirmed peak.
}

/// Refine a peak position with a parabola through its neighbours.
fn parabolic_peak(values: &[f32], index: usize) -> f32 {
    if index == 0 || index + 1 >= values.len() {
        return index as f32;
    }
    let (a, b, c) = (values[index - 1], values[index], values[index + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < f32::EPSILON {
        return index as f32;
    }
    index as f32 + 0.5 * (a - c) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (std::f64::consts::TAU * freq * i as f64 / sample_rate).sin() as f32 * 0.5)
            .collect()
    }

    fn detect(signal: &[f32], sample_rate: f64) -> Vec<f64> {
        let mut detector = PitchDetector::new(sample_rate);
        let mut estimates = Vec::new();
        for block in signal.chunks(256) {
            detector.process(block, |f| estimates.push(f));
        }
        estimates
    }

    #[test]
    fn test_freq_to_midi() {
        assert_eq!(freq_to_midi(440.0), Some(69));
        assert_eq!(freq_to_midi(261.63), Some(60));
        assert_eq!(freq_to_midi(0.0), None);
        assert_eq!(freq_to_midi(-5.0), None);
        assert_eq!(freq_to_midi(f64::NAN), None);
        assert!((midi_to_freq(69) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_detects_a440_at_reference_rate() {
        let estimates = detect(&sine(440.0, 44_100.0, 4096), 44_100.0);
        assert_eq!(estimates.len(), 4);
        for f in estimates {
            assert!((f - 440.0).abs() < 2.0, "estimate {f}");
            assert_eq!(freq_to_midi(f), Some(69));
        }
    }

    #[test]
    fn test_rescales_for_host_rate() {
        let estimates = detect(&sine(440.0, 48_000.0, 4096), 48_000.0);
        assert_eq!(estimates.len(), 4);
        for f in estimates {
            assert_eq!(freq_to_midi(f), Some(69), "estimate {f}");
        }
    }

    #[test]
    fn test_harmonic_tone_reports_fundamental() {
        let sr = 44_100.0;
        let signal: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f64 / sr;
                let w = std::f64::consts::TAU * 220.0 * t;
                (0.5 * w.sin() + 0.3 * (2.0 * w).sin() + 0.2 * (3.0 * w).sin()) as f32
            })
            .collect();
        for f in detect(&signal, sr) {
            assert_eq!(freq_to_midi(f), Some(57), "estimate {f}");
        }
    }

    #[test]
    fn test_silence_has_no_pitch() {
        let estimates = detect(&vec![0.0; 2048], 44_100.0);
        assert_eq!(estimates, vec![0.0, 0.0]);
    }

    #[test]
    fn test_overflow_carries_into_next_window() {
        let mut detector = PitchDetector::new(44_100.0);
        let signal = sine(440.0, 44_100.0, 1500);
        let mut count = 0;
        detector.process(&signal, |_| count += 1);
        assert_eq!(count, 1);
        assert_eq!(detector.fill, 1500 - ANALYSIS_WINDOW);
    }
}
