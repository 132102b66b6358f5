// Dry/wet output stage.

use std::ops::Range;

use crate::audio_buffer::{AudioBuffer, ChannelBuffer};

use super::limiter::{PeakLimiter, PeakLimiterParams, db_to_linear};

// ═══════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════

/// Fixed make-up gain on the resynthesized path.
pub const WET_GAIN_DB: f32 = 9.0;

// ═══════════════════════════════════════════════════════════════════
// Balanced mix
// ═══════════════════════════════════════════════════════════════════

/// Constant-power dry/wet gains for `mix` in `[0, 1]`.
#[inline]
pub fn balanced_gains(mix: f32) -> (f32, f32) {
    let angle = mix.clamp(0.0, 1.0) * 0.5 * std::f32::consts::PI;
    (angle.cos(), angle.sin())
}

// ═══════════════════════════════════════════════════════════════════
// Output Mixer
// ═══════════════════════════════════════════════════════════════════

/// Collects the dry input and the wet grain output for one sub-block and
/// blends them into the host's output.
#[derive(Debug)]
pub struct OutputMixer {
    dry: ChannelBuffer,
    wet: ChannelBuffer,
    wet_gain: f32,
    limiter: PeakLimiter,
}

impl OutputMixer {
    pub fn new(channels: usize, max_block: usize, sample_rate: f32) -> Self {
        Self {
            dry: ChannelBuffer::new(channels, max_block),
            wet: ChannelBuffer::new(channels, max_block),
            wet_gain: db_to_linear(WET_GAIN_DB),
            limiter: PeakLimiter::new(PeakLimiterParams::default(), sample_rate),
        }
    }

    pub fn reset(&mut self) {
        self.dry.clear();
        self.wet.clear();
        self.limiter.reset();
    }

    /// Start a sub-block of `frames` frames: copy the dry input in and clear
    /// the wet bus.
    pub fn begin(&mut self, input: &AudioBuffer, range: Range<usize>) {
        let frames = range.len().min(self.dry.capacity_frames());
        self.dry.set_frames(frames);
        self.wet.set_frames(frames);
        for ch in 0..self.dry.channels() {
            let src_ch = ch.min(input.channels - 1);
            let src = &input.channel(src_ch)[range.start..range.start + frames];
            self.dry.channel_mut(ch).copy_from_slice(src);
            self.wet.channel_mut(ch).fill(0.0);
        }
    }

    /// Wet bus for the current sub-block; the resynthesizer adds into it.
    #[inline]
    pub fn wet_mut(&mut self) -> &mut ChannelBuffer {
        &mut self.wet
    }

    /// Gain, limit, and blend the sub-block into `output` at `offset`.
    pub fn finish(&mut self, output: &mut AudioBuffer, offset: usize, mix: f32) {
        let frames = self.wet.frames();
        self.wet.scale(self.wet_gain);
        self.limiter.process(&mut self.wet, frames);

        let (dry_gain, wet_gain) = balanced_gains(mix);
        for ch in 0..output.channels {
            let src_ch = ch.min(self.wet.channels() - 1);
            let dry = self.dry.channel(src_ch);
            let wet = self.wet.channel(src_ch);
            let out = &mut output.channel_mut(ch)[offset..offset + frames];
            for i in 0..frames {
                out[i] = dry[i] * dry_gain + wet[i] * wet_gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_gains_endpoints() {
        let (dry, wet) = balanced_gains(0.0);
        assert!((dry - 1.0).abs() < 1e-6 && wet.abs() < 1e-6);

        let (dry, wet) = balanced_gains(1.0);
        assert!(dry.abs() < 1e-6 && (wet - 1.0).abs() < 1e-6);

        let (dry, wet) = balanced_gains(0.5);
        assert!((dry - wet).abs() < 1e-6);
        assert!((dry * dry + wet * wet - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dry_only_passes_input() {
        let mut mixer = OutputMixer::new(2, 8, 48_000.0);
        let mut input: Vec<f32> = (0..16).map(|i| i as f32 * 0.01).collect();
        let mut out = vec![0.0; 16];
        let input = AudioBuffer::new(&mut input, 2);
        let mut output = AudioBuffer::new(&mut out, 2);

        mixer.begin(&input, 0..8);
        mixer.finish(&mut output, 0, 0.0);
        for ch in 0..2 {
            for (o, i) in output.channel(ch).iter().zip(input.channel(ch)) {
                assert!((o - i).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_wet_is_boosted_then_limited() {
        let mut mixer = OutputMixer::new(1, 4, 48_000.0);
        let mut input = vec![0.0; 4];
        let mut out = vec![0.0; 4];
        let input = AudioBuffer::new(&mut input, 1);
        let mut output = AudioBuffer::new(&mut out, 1);

        mixer.begin(&input, 0..4);
        mixer.wet_mut().channel_mut(0).copy_from_slice(&[0.01, 0.5, 0.0, 0.0]);
        mixer.finish(&mut output, 0, 1.0);

        let boosted = 0.01 * db_to_linear(WET_GAIN_DB);
        assert!((output.channel(0)[0] - boosted).abs() < 1e-4);
        assert!(output.channel(0)[1] <= db_to_linear(-11.0) + 1e-5);
    }

    #[test]
    fn test_sub_block_offset() {
        let mut mixer = OutputMixer::new(1, 4, 48_000.0);
        let mut input = vec![1.0; 8];
        let mut out = vec![0.0; 8];
        let input = AudioBuffer::new(&mut input, 1);
        let mut output = AudioBuffer::new(&mut out, 1);

        mixer.begin(&input, 4..8);
        mixer.finish(&mut output, 4, 0.0);
        assert_eq!(&output.channel(0)[..4], &[0.0; 4]);
        assert!(output.channel(0)[4..].iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }
}
