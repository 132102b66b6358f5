// Peak limiter for the wet path.

use crate::audio_buffer::ChannelBuffer;

#[derive(Clone, Copy, Debug)]
pub struct PeakLimiterParams {
    pub threshold_db: f32,
    pub release_ms: f32,
}

impl Default for PeakLimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -11.0,
            release_ms: 5.0,
        }
    }
}

/// Instant-attack, exponential-release peak limiter with linked channels.
#[derive(Debug, Clone)]
pub struct PeakLimiter {
    params: PeakLimiterParams,
    ceiling: f32,
    release_coeff: f32,
    gain: f32,
}

impl PeakLimiter {
    pub fn new(params: PeakLimiterParams, sample_rate: f32) -> Self {
        let mut limiter = Self {
            params,
            ceiling: db_to_linear(params.threshold_db),
            release_coeff: 0.0,
            gain: 1.0,
        };
        limiter.prepare(sample_rate);
        limiter
    }

    pub fn prepare(&mut self, sample_rate: f32) {
        self.release_coeff = time_to_coeff(self.params.release_ms, sample_rate.max(1.0));
        self.gain = 1.0;
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }

    #[inline]
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Limit the first `frames` frames of `buffer` in place.
    pub fn process(&mut self, buffer: &mut ChannelBuffer, frames: usize) {
        let frames = frames.min(buffer.frames());
        let channels = buffer.channels();
        for frame in 0..frames {
            let mut peak = 0.0f32;
            for ch in 0..channels {
                let x = buffer.channel(ch)[frame];
                if x.is_finite() {
                    peak = peak.max(x.abs());
                }
            }
            let target = if peak > self.ceiling {
                self.ceiling / peak
            } else {
                1.0
            };
            self.gain = smooth_gain(self.gain, target, self.release_coeff);

            for ch in 0..channels {
                let sample = &mut buffer.channel_mut(ch)[frame];
                let x = if sample.is_finite() { *sample } else { 0.0 };
                *sample = (x * self.gain).clamp(-self.ceiling, self.ceiling);
            }
        }
    }
}

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let time_s = time_ms.max(0.0) * 0.001;
    if time_s <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_s * sample_rate)).exp()
    }
}

/// Attack is instant; recovery follows the release coefficient.
#[inline]
fn smooth_gain(current: f32, target: f32, release_coeff: f32) -> f32 {
    if target < current {
        target
    } else {
        release_coeff * current + (1.0 - release_coeff) * target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_matches_threshold() {
        let limiter = PeakLimiter::new(PeakLimiterParams::default(), 48_000.0);
        assert!((limiter.ceiling() - 0.281_838).abs() < 1e-5);
    }

    #[test]
    fn test_quiet_signal_passes_untouched() {
        let mut limiter = PeakLimiter::new(PeakLimiterParams::default(), 48_000.0);
        let mut buffer = ChannelBuffer::new(2, 64);
        buffer.channel_mut(0).fill(0.1);
        buffer.channel_mut(1).fill(-0.2);
        limiter.process(&mut buffer, 64);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.1));
        assert!(buffer.channel(1).iter().all(|&s| s == -0.2));
    }

    #[test]
    fn test_loud_signal_never_exceeds_ceiling() {
        let mut limiter = PeakLimiter::new(PeakLimiterParams::default(), 48_000.0);
        let mut buffer = ChannelBuffer::new(2, 256);
        for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = (i as f32 * 0.1).sin() * 3.0;
        }
        limiter.process(&mut buffer, 256);
        let ceiling = limiter.ceiling();
        assert!(buffer.peak() <= ceiling + 1e-6);
        assert!(limiter.gain() < 1.0);
    }

    #[test]
    fn test_gain_recovers_after_release() {
        let sr = 48_000.0;
        let mut limiter = PeakLimiter::new(PeakLimiterParams::default(), sr);
        let mut buffer = ChannelBuffer::new(1, 1);
        buffer.channel_mut(0)[0] = 1.0;
        limiter.process(&mut buffer, 1);
        let clamped = limiter.gain();

        let mut quiet = ChannelBuffer::new(1, 2400);
        limiter.process(&mut quiet, 2400);
        assert!(clamped < 0.3);
        assert!(limiter.gain() > 0.99);
    }

    #[test]
    fn test_non_finite_input_is_zeroed() {
        let mut limiter = PeakLimiter::new(PeakLimiterParams::default(), 44_100.0);
        let mut buffer = ChannelBuffer::new(1, 2);
        buffer.channel_mut(0)[0] = f32::NAN;
        buffer.channel_mut(0)[1] = f32::INFINITY;
        limiter.process(&mut buffer, 2);
        assert_eq!(buffer.channel(0), &[0.0, 0.0]);
    }
}
