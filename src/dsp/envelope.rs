// Envelope generators.

// ═══════════════════════════════════════════════════════════════════
// ADSR Envelope
// ═══════════════════════════════════════════════════════════════════

/// Cutoff of the one-pole smoother on the envelope output.
const SMOOTHING_CUTOFF_HZ: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear ADSR with a one-pole smoothed output.
///
/// Driven directly by `note_on` / `note_off` and pulled one gain sample at
/// a time with `next_gain`.
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    stage: EnvelopeStage,
    level: f32,
    smooth_level: f32,
    smooth_coeff: f32,

    // Parameters (in seconds)
    attack: f32,
    decay: f32,
    sustain: f32, // 0-1 level
    release: f32,

    sample_rate: f32,
    release_level: f32,
}

impl AdsrEnvelope {
    pub fn new(sample_rate: f32) -> Self {
        let mut env = Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            smooth_level: 0.0,
            smooth_coeff: 1.0,
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
            sample_rate: 44_100.0,
            release_level: 0.0,
        };
        env.set_sample_rate(sample_rate);
        env
    }

    /// Gate envelope: instant attack to full level, hold, release over
    /// `release` seconds.
    pub fn gate(sample_rate: f32, release: f32) -> Self {
        let mut env = Self::new(sample_rate);
        env.set_release(release);
        env
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate.max(1.0);
        self.smooth_coeff =
            1.0 - (-2.0 * std::f32::consts::PI * SMOOTHING_CUTOFF_HZ / self.sample_rate).exp();
    }

    pub fn configure(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) {
        self.attack = attack.max(0.0);
        self.decay = decay.max(0.0);
        self.sustain = sustain.clamp(0.0, 1.0);
        self.release = release.max(0.0);
    }

    pub fn set_release(&mut self, release: f32) {
        self.release = release.max(0.0);
    }

    pub fn release(&self) -> f32 {
        self.release
    }

    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    pub fn note_off(&mut self) {
        if self.stage != EnvelopeStage::Idle && self.stage != EnvelopeStage::Release {
            self.release_level = self.level;
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Jump straight into the release stage from `level`.
    ///
    /// Used for fade-out only paths that never saw a note-on.
    pub fn release_from(&mut self, level: f32) {
        let level = level.clamp(0.0, 1.0);
        self.level = level;
        self.smooth_level = level;
        self.release_level = level;
        self.stage = if level > 0.0 {
            EnvelopeStage::Release
        } else {
            EnvelopeStage::Idle
        };
    }

    /// Current (unsmoothed) envelope level.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Next gain sample in `0.0..=1.0`.
    #[inline]
    pub fn next_gain(&mut self) -> f32 {
        let env = self.process_sample();
        self.smooth_level += (env - self.smooth_level) * self.smooth_coeff;
        self.smooth_level.max(0.0)
    }

    /// True while the envelope can still produce a non-zero gain.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle || self.smooth_level > 1e-6
    }

    #[inline]
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
        self.smooth_level = 0.0;
        self.release_level = 0.0;
    }

    #[inline]
    fn process_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => 0.0,

            EnvelopeStage::Attack => {
                let rate = 1.0 / (self.attack * self.sample_rate).max(1.0);
                self.level += rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
                self.level
            }

            EnvelopeStage::Decay => {
                let rate = (1.0 - self.sustain) / (self.decay * self.sample_rate).max(1.0);
                self.level -= rate;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
                self.level
            }

            EnvelopeStage::Sustain => self.sustain,

            EnvelopeStage::Release => {
                let rate = self.release_level / (self.release * self.sample_rate).max(1.0);
                self.level -= rate;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
                self.level
            }
        }
    }
}

impl Default for AdsrEnvelope {
    fn default() -> Self {
        Self::new(44_100.0)
    }
}
