// src/engine.rs

use log::{debug, info};

use crate::audio_buffer::AudioBuffer;
use crate::capture::InputCapture;
use crate::config::EngineConfig;
use crate::dsp::{EnvelopeStage, OutputMixer};
use crate::error::ConfigResult;
use crate::event::{CapturedMelody, GeneratedMelody, StepEvent};
use crate::isolator::{MAX_GRAIN_FRAMES, VoiceGrain, VoiceIsolator};
use crate::melody::MelodyGenerator;
use crate::params::ParamSnapshot;
use crate::phase_clock::{ClockState, PhaseClock, Sweep};
use crate::pitch::{ANALYSIS_WINDOW, PitchDetector, freq_to_midi};
use crate::resynth::GrainResynthesizer;
use crate::transport::Transport;

/// Slowest tempo the parameter range allows; sizes the per-cycle buffers.
const MIN_TEMPO: f64 = 60.0;

/// Longest cycle in steps.
const MAX_CYCLE_LENGTH: usize = PhaseClock::MAX_STEPS;

/// Real-time counter-melody engine.
///
/// This struct runs exclusively on the audio thread.
/// After construction it does not allocate, lock, or block: every buffer is
/// sized for the slowest tempo and longest cycle up front.
pub struct Engine {
    config: EngineConfig,

    /// Step grid of the running cycle
    transport: Transport,

    detector: PitchDetector,
    mono: Vec<f32>,

    /// Pitch estimates of the running cycle, one per analysis window
    pitch_log: Vec<f32>,

    /// Note of the most recent analysis window
    latest_note: Option<u8>,

    clock: PhaseClock,
    capture: InputCapture,

    captured: CapturedMelody,
    last_captured: CapturedMelody,
    generated: GeneratedMelody,
    generator: MelodyGenerator,

    isolator: VoiceIsolator,
    grain: VoiceGrain,
    grain_serial: u64,

    resynth: GrainResynthesizer,
    mixer: OutputMixer,

    /// Note last transcribed into the captured melody
    input_note: Option<u8>,

    /// Note sounding at the last display sweep
    output_note: Option<u8>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> ConfigResult<Self> {
        config.validate()?;

        let sample_rate = config.sample_rate;
        let channels = config.channels;
        let max_block = config.max_block_size;
        let transport = Transport::new(sample_rate, 120.0, config.speed);

        let slowest = Transport::new(sample_rate, MIN_TEMPO, config.speed);
        let max_capture = slowest.capture_frames(MAX_CYCLE_LENGTH);

        let mut capture = InputCapture::new(channels);
        capture.reset(channels, max_capture);
        capture.reset(channels, 0);

        let mut resynth = GrainResynthesizer::new(channels, sample_rate as f32, config.seed);
        resynth.reserve(MAX_GRAIN_FRAMES);
        resynth.set_release(transport.step_seconds() as f32);

        Ok(Self {
            transport,
            detector: PitchDetector::new(sample_rate),
            mono: vec![0.0; max_block],
            pitch_log: Vec::with_capacity(max_capture / ANALYSIS_WINDOW + 2),
            latest_note: None,
            clock: PhaseClock::new(transport.step_samples(), 16),
            capture,
            captured: CapturedMelody::default(),
            last_captured: CapturedMelody::default(),
            generated: GeneratedMelody::default(),
            generator: MelodyGenerator::new(config.seed),
            isolator: VoiceIsolator::new(channels),
            grain: VoiceGrain::new(channels),
            grain_serial: 0,
            resynth,
            mixer: OutputMixer::new(channels, max_block, sample_rate as f32),
            input_note: None,
            output_note: None,
            config,
        })
    }

    /// Process one host block.
    ///
    /// Called once per audio callback. Blocks longer than the configured
    /// maximum are split into sub-blocks.
    pub fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamSnapshot) {
        let frames = input.frames.min(output.frames);
        let mut start = 0;
        while start < frames {
            let end = (start + self.config.max_block_size).min(frames);
            self.process_sub_block(input, output, start..end, params);
            start = end;
        }
        for ch in 0..output.channels {
            output.channel_mut(ch)[frames..].fill(0.0);
        }
    }

    fn process_sub_block(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        range: std::ops::Range<usize>,
        params: &ParamSnapshot,
    ) {
        let frames = range.len();

        // Downmix
        let mono = &mut self.mono[..frames];
        let gain = 1.0 / input.channels as f32;
        mono.fill(0.0);
        for ch in 0..input.channels {
            for (m, s) in mono.iter_mut().zip(&input.channel(ch)[range.clone()]) {
                *m += s * gain;
            }
        }

        // Pitch, arming
        {
            let clock = &mut self.clock;
            let pitch_log = &mut self.pitch_log;
            let latest_note = &mut self.latest_note;
            self.detector.process(mono, |freq| {
                *latest_note = freq_to_midi(freq);
                if freq > 0.0 {
                    clock.arm();
                }
                if clock.is_active() && pitch_log.len() < pitch_log.capacity() {
                    pitch_log.push(freq as f32);
                }
            });
        }
        if self.clock.state() == ClockState::Armed {
            self.begin_first_cycle(params);
        }

        // Capture, advance
        if self.clock.is_active() {
            self.capture.push(input, range.clone());
        }
        self.clock.advance(frames);

        // Step sweeps
        self.run_sweeps(params);

        if self.clock.at_cycle_end() {
            self.end_cycle(params);
        }

        // Render and mix
        self.mixer.begin(input, range.clone());
        self.resynth.render(&self.grain, self.mixer.wet_mut());
        self.mixer.finish(output, range.start, params.mix);
    }

    fn run_sweeps(&mut self, params: &ParamSnapshot) {
        let cycle_length = self.clock.cycle_length();
        let mut transcribed = false;

        let captured = &mut self.captured;
        let generated = &self.generated;
        let resynth = &mut self.resynth;
        let grain = &self.grain;
        let latest_note = self.latest_note;
        let input_note = &mut self.input_note;
        let output_note = &mut self.output_note;

        self.clock.sweep(|fire| match fire.sweep {
            Sweep::Transcription => {
                captured.set(fire.step, latest_note);
                *input_note = latest_note;
                transcribed = true;
            }
            Sweep::Playback => {
                match generated.get(fire.step) {
                    StepEvent::Note(note) => {
                        resynth.trigger(grain, note, params.octave, params.detune)
                    }
                    StepEvent::Rest => resynth.silence(),
                    StepEvent::Hold => {}
                }
                if generated.get((fire.step + 1) % cycle_length).interrupts() {
                    resynth.release();
                }
            }
            Sweep::Display => {
                *output_note = resynth.sounding_note();
            }
        });

        if transcribed {
            let current = Transport::new(self.config.sample_rate, params.tempo, self.config.speed);
            let drift = current.cycle_drift(cycle_length, self.clock.step_samples());
            self.clock.set_drift(drift);
        }
    }

    // -------------------------------
    // MARK: Cycle boundaries
    // -------------------------------

    fn begin_first_cycle(&mut self, params: &ParamSnapshot) {
        self.prepare_cycle(params);
        info!(
            "armed: {} steps of {} samples at {} bpm",
            self.clock.cycle_length(),
            self.clock.step_samples(),
            params.tempo
        );
    }

    /// Reset per-cycle state for a cycle on the current tempo and length.
    fn prepare_cycle(&mut self, params: &ParamSnapshot) {
        self.transport = Transport::new(self.config.sample_rate, params.tempo, self.config.speed);
        let step = self.transport.step_samples();
        let length = params.cycle_length;

        self.captured.clear();
        self.capture
            .reset(self.config.channels, self.transport.capture_frames(length));
        self.resynth.set_release(self.transport.step_seconds() as f32);

        if self.clock.state() == ClockState::Armed {
            self.clock.configure(step, length);
        } else {
            self.clock.restart(step, length);
        }
        self.clock
            .set_drift(self.transport.cycle_drift(self.clock.cycle_length(), step));
    }

    fn end_cycle(&mut self, params: &ParamSnapshot) {
        let first = self.clock.finish_cycle();
        if first && !self.pitch_log.is_empty() {
            self.pitch_log.remove(0);
        }

        if self.pitch_log.iter().all(|&freq| freq <= 0.0) {
            self.go_idle();
            info!("silent cycle, back to idle");
            return;
        }

        self.last_captured = self.captured;
        self.generated = self
            .generator
            .generate(params.key, params.scale, params.density);
        debug!(
            "cycle {}: generated {} notes (key {}, {:?}, density {})",
            self.clock.cycles_completed(),
            self.generated.note_steps().count(),
            params.key,
            params.scale,
            params.density
        );

        match self
            .isolator
            .isolate(&self.captured, &self.capture, &mut self.grain)
        {
            Some(region) => {
                self.grain_serial += 1;
                debug!(
                    "grain isolated at note {} from steps {}..{} ({} frames)",
                    region.voice_note,
                    region.first,
                    region.first + region.len,
                    self.grain.frames()
                );
            }
            None => debug!("no stable run this cycle, keeping previous grain"),
        }

        self.pitch_log.clear();
        self.prepare_cycle(params);
    }

    fn go_idle(&mut self) {
        self.clock.stop();
        self.resynth.stop();
        self.captured.clear();
        self.pitch_log.clear();
        self.output_note = None;
    }

    // -------------------------------
    // MARK: Control
    // -------------------------------

    /// Return to Idle; the sounding tile fades out on the tail path.
    pub fn stop(&mut self) {
        if self.clock.is_active() {
            info!("stopped");
        }
        self.go_idle();
    }

    /// Forget everything (host transport reset).
    pub fn reset(&mut self) {
        self.go_idle();
        self.resynth.reset();
        self.detector.reset();
        self.mixer.reset();
        self.capture.reset(self.config.channels, 0);
        self.grain.buffer.set_frames(0);
        self.grain.voice_note = 0;
        self.generated = GeneratedMelody::default();
        self.last_captured = CapturedMelody::default();
        self.latest_note = None;
        self.input_note = None;
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn clock_state(&self) -> ClockState {
        self.clock.state()
    }

    #[inline]
    pub fn clock(&self) -> &PhaseClock {
        &self.clock
    }

    #[inline]
    pub fn cycles_completed(&self) -> u64 {
        self.clock.cycles_completed()
    }

    /// Melody transcribed so far in the running cycle.
    #[inline]
    pub fn captured_melody(&self) -> &CapturedMelody {
        &self.captured
    }

    /// Melody transcribed in the last completed cycle.
    #[inline]
    pub fn last_captured_melody(&self) -> &CapturedMelody {
        &self.last_captured
    }

    #[inline]
    pub fn generated_melody(&self) -> &GeneratedMelody {
        &self.generated
    }

    #[inline]
    pub fn voice_grain(&self) -> &VoiceGrain {
        &self.grain
    }

    /// Increments every time a new grain replaces the old one.
    #[inline]
    pub fn grain_serial(&self) -> u64 {
        self.grain_serial
    }

    /// Note of the grain, or `None` before the first isolation.
    #[inline]
    pub fn voice_note(&self) -> Option<u8> {
        (!self.grain.is_empty()).then_some(self.grain.voice_note)
    }

    /// Stage of the envelope gating the sounding tile.
    #[inline]
    pub fn flicker_stage(&self) -> EnvelopeStage {
        self.resynth.flicker_stage()
    }

    #[inline]
    pub fn input_note(&self) -> Option<u8> {
        self.input_note
    }

    #[inline]
    pub fn output_note(&self) -> Option<u8> {
        self.output_note
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamId;

    const SR: f64 = 44_100.0;
    const BLOCK: usize = 512;

    fn engine() -> Engine {
        Engine::new(EngineConfig::new(SR, 2).with_seed(9)).unwrap()
    }

    fn params(density: f32) -> ParamSnapshot {
        ParamSnapshot::default()
            .with(ParamId::CycleLength, 8.0)
            .with(ParamId::Density, density)
            .with(ParamId::Mix, 1.0)
    }

    /// Planar stereo block of a 440 Hz tone starting at sample `offset`.
    fn tone_block(offset: usize, frames: usize) -> Vec<f32> {
        let mono: Vec<f32> = (0..frames)
            .map(|i| {
                let t = (offset + i) as f64 / SR;
                ((std::f64::consts::TAU * 440.0 * t).sin() * 0.5) as f32
            })
            .collect();
        [mono.clone(), mono].concat()
    }

    fn run_block(engine: &mut Engine, data: &mut [f32], params: &ParamSnapshot) -> Vec<f32> {
        let mut out = vec![0.0; data.len()];
        let input = AudioBuffer::new(data, 2);
        let mut output = AudioBuffer::new(&mut out, 2);
        engine.process(&input, &mut output, params);
        out
    }

    /// Feed the tone until `cycles` cycles have completed.
    fn sing_cycles(engine: &mut Engine, params: &ParamSnapshot, cycles: u64) -> usize {
        let mut offset = 0;
        while engine.cycles_completed() < cycles {
            let mut block = tone_block(offset, BLOCK);
            run_block(engine, &mut block, params);
            offset += BLOCK;
            assert!(offset < 1_000_000, "cycle never completed");
        }
        offset
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(Engine::new(EngineConfig::new(-1.0, 2)).is_err());
    }

    #[test]
    fn test_sustained_a440_transcribes_and_isolates() {
        let mut engine = engine();
        let params = params(6.0);
        sing_cycles(&mut engine, &params, 1);

        let captured = engine.last_captured_melody();
        for step in 0..8 {
            assert_eq!(captured.get(step), Some(69), "step {step}");
        }
        assert_eq!(engine.voice_note(), Some(69));
        assert_eq!(engine.grain_serial(), 1);
        assert!((engine.voice_grain().buffer.peak() - 1.0).abs() < 1e-5);
        assert_eq!(engine.generated_melody().note_steps().count(), 32);
        assert_eq!(engine.clock_state(), ClockState::Running);
        assert_eq!(engine.input_note(), Some(69));
    }

    #[test]
    fn test_silence_never_arms() {
        let mut engine = engine();
        let params = params(6.0);
        for _ in 0..200 {
            let mut block = vec![0.0; BLOCK * 2];
            let out = run_block(&mut engine, &mut block, &params);
            assert!(out.iter().all(|&s| s == 0.0));
        }
        assert_eq!(engine.clock_state(), ClockState::Idle);
        assert!(engine.voice_grain().is_empty());
        assert_eq!(*engine.generated_melody(), GeneratedMelody::default());
    }

    #[test]
    fn test_silent_cycle_returns_to_idle_without_updates() {
        let mut engine = engine();
        let params = params(4.0);
        sing_cycles(&mut engine, &params, 1);

        let mut went_idle = false;
        for _ in 0..1000 {
            let generated = *engine.generated_melody();
            let grain = engine.voice_grain().buffer.channel(0).to_vec();
            let serial = engine.grain_serial();

            let mut block = vec![0.0; BLOCK * 2];
            run_block(&mut engine, &mut block, &params);

            if engine.clock_state() == ClockState::Idle {
                assert_eq!(*engine.generated_melody(), generated);
                assert_eq!(engine.voice_grain().buffer.channel(0), &grain[..]);
                assert_eq!(engine.grain_serial(), serial);
                went_idle = true;
                break;
            }
        }
        assert!(went_idle);
        assert_eq!(engine.voice_note(), Some(69));
    }

    #[test]
    fn test_density_one_generates_single_note() {
        let mut engine = engine();
        sing_cycles(&mut engine, &params(1.0), 1);
        let steps: Vec<usize> = engine.generated_melody().note_steps().collect();
        assert_eq!(steps, vec![0]);
    }

    #[test]
    fn test_second_cycle_produces_wet_output() {
        let mut engine = engine();
        let params = params(6.0);
        let mut offset = sing_cycles(&mut engine, &params, 1);

        let mut peak = 0.0_f32;
        for _ in 0..40 {
            let mut block = tone_block(offset, BLOCK);
            let out = run_block(&mut engine, &mut block, &params);
            peak = out.iter().fold(peak, |p, s| p.max(s.abs()));
            offset += BLOCK;
        }
        assert!(peak > 0.01);
        assert!(peak <= 0.2819);
        assert!(engine.output_note().is_some());
    }

    #[test]
    fn test_flicker_releases_only_before_interrupting_steps() {
        let mut engine = engine();
        let params = ParamSnapshot::default()
            .with(ParamId::CycleLength, 16.0)
            .with(ParamId::Density, 2.0)
            .with(ParamId::Mix, 1.0);
        let mut offset = sing_cycles(&mut engine, &params, 1);

        let generated = *engine.generated_melody();
        assert!(matches!(generated.get(0), StepEvent::Note(_)));
        for step in 1..16 {
            assert_eq!(generated.get(step), StepEvent::Hold, "step {step}");
        }

        let step_samples = engine.clock().step_samples();
        let mut released = false;
        loop {
            let mut block = tone_block(offset, BLOCK);
            run_block(&mut engine, &mut block, &params);
            offset += BLOCK;
            if engine.cycles_completed() != 1 {
                break;
            }
            let step = engine.clock().phase() / step_samples;
            match step {
                1..=14 => {
                    assert_ne!(engine.flicker_stage(), EnvelopeStage::Release, "step {step}")
                }
                15 if !released => {
                    assert_eq!(engine.flicker_stage(), EnvelopeStage::Release);
                    released = true;
                }
                _ => {}
            }
        }
        assert!(released);
    }

    #[test]
    fn test_drift_follows_tempo_change_within_cycle() {
        let mut engine = engine();
        let params = params(6.0);
        let slower = params.with(ParamId::Tempo, 100.0);
        let step_samples = Transport::new(SR, 120.0, 1.0).step_samples();

        let mut offset = 0;
        while engine.clock_state() == ClockState::Idle || engine.clock().phase() <= 2 * step_samples
        {
            let mut block = tone_block(offset, BLOCK);
            run_block(&mut engine, &mut block, &params);
            offset += BLOCK;
            assert!(offset < 100_000);
        }
        assert_eq!(
            engine.clock().sample_drift(),
            Transport::new(SR, 120.0, 1.0).cycle_drift(8, step_samples)
        );

        while engine.clock().phase() <= 4 * step_samples {
            let mut block = tone_block(offset, BLOCK);
            run_block(&mut engine, &mut block, &slower);
            offset += BLOCK;
        }
        let expected = Transport::new(SR, 100.0, 1.0).cycle_drift(8, step_samples);
        assert_eq!(engine.cycles_completed(), 0);
        assert_eq!(engine.clock().step_samples(), step_samples);
        assert_eq!(engine.clock().sample_drift(), expected);
        assert_eq!(
            engine.clock().cycle_end() as i64,
            (8 * step_samples) as i64 + expected
        );
    }

    #[test]
    fn test_arming_window_alone_does_not_keep_clock_running() {
        let mut engine = engine();
        let params = params(6.0);
        for offset in [0, BLOCK] {
            let mut block = tone_block(offset, BLOCK);
            run_block(&mut engine, &mut block, &params);
        }
        assert_ne!(engine.clock_state(), ClockState::Idle);

        let mut blocks = 0;
        while engine.cycles_completed() == 0 {
            let mut block = vec![0.0; BLOCK * 2];
            run_block(&mut engine, &mut block, &params);
            blocks += 1;
            assert!(blocks < 1000, "cycle never completed");
        }
        assert_eq!(engine.clock_state(), ClockState::Idle);
        assert_eq!(engine.grain_serial(), 0);
        assert!(engine.voice_grain().is_empty());
        assert_eq!(*engine.generated_melody(), GeneratedMelody::default());
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let mut engine = engine();
        let params = params(6.0);
        sing_cycles(&mut engine, &params, 1);
        engine.stop();
        assert_eq!(engine.clock_state(), ClockState::Idle);
        assert_eq!(engine.output_note(), None);

        engine.reset();
        assert!(engine.voice_grain().is_empty());
        assert_eq!(engine.voice_note(), None);
    }

    #[test]
    fn test_long_host_block_is_split() {
        let mut engine =
            Engine::new(EngineConfig::new(SR, 2).with_max_block_size(128)).unwrap();
        let dry = ParamSnapshot::default().with(ParamId::Mix, 0.0);
        let mut block = tone_block(0, 1000);
        let expected = block.clone();
        let out = run_block(&mut engine, &mut block, &dry);
        for (o, e) in out.iter().zip(&expected) {
            assert!((o - e).abs() < 1e-6);
        }
    }
}
