// src/phase_clock.rs
//
// Cycle-locked step sequencer.
//
// The clock counts samples since the start of the current cycle. Every
// block it advances, then sweeps all steps of the cycle and fires each
// step's one-shot for every sweep whose firing point has been passed.
// A 32-bit mask per sweep remembers what already fired this cycle.

use std::fmt;

/// Lifecycle of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    /// No cycle running; waiting for a pitched input.
    #[default]
    Idle,

    /// Pitch seen; the first cycle starts with the next advance.
    Armed,

    /// Advancing and sweeping.
    Running,
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockState::Idle => write!(f, "idle"),
            ClockState::Armed => write!(f, "armed"),
            ClockState::Running => write!(f, "running"),
        }
    }
}

/// One-shot flags for up to 32 steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepMask(u32);

impl StepMask {
    #[inline]
    pub fn set_executed(&mut self, step: usize) {
        debug_assert!(step < 32);
        self.0 |= 1u32 << step;
    }

    #[inline]
    pub fn is_executed(&self, step: usize) -> bool {
        debug_assert!(step < 32);
        self.0 & (1u32 << step) != 0
    }

    /// True once every step in `0..steps` has fired.
    #[inline]
    pub fn all_executed(&self, steps: usize) -> bool {
        let full = if steps >= 32 { u32::MAX } else { (1u32 << steps) - 1 };
        self.0 & full == full
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Which sweep a step fired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    /// Half a step in: the step's pitch has been observed; record it.
    Transcription,

    /// On the step boundary: act on the generated melody.
    Playback,

    /// Half a step in: refresh the display note.
    Display,
}

/// A step one-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFire {
    pub sweep: Sweep,
    pub step: usize,
}

/// Sample-accurate step sequencer.
#[derive(Debug, Clone)]
pub struct PhaseClock {
    state: ClockState,

    /// True until the first cycle after arming completes
    first_cycle: bool,

    /// Samples elapsed in the current cycle
    phase: usize,

    step_samples: usize,
    cycle_length: usize,

    /// Residual rounding error added to the cycle length
    sample_drift: i64,

    transcription: StepMask,
    playback: StepMask,
    display: StepMask,

    cycles_completed: u64,
}

impl PhaseClock {
    pub const MAX_STEPS: usize = 32;

    pub fn new(step_samples: usize, cycle_length: usize) -> Self {
        Self {
            state: ClockState::Idle,
            first_cycle: false,
            phase: 0,
            step_samples: step_samples.max(1),
            cycle_length: cycle_length.clamp(1, Self::MAX_STEPS),
            sample_drift: 0,
            transcription: StepMask::default(),
            playback: StepMask::default(),
            display: StepMask::default(),
            cycles_completed: 0,
        }
    }

    // -------------------------------
    // MARK: State transitions
    // -------------------------------

    /// Idle -> Armed on the first pitched window.
    pub fn arm(&mut self) {
        if self.state == ClockState::Idle {
            self.state = ClockState::Armed;
            self.first_cycle = true;
            self.phase = 0;
            self.sample_drift = 0;
            self.clear_masks();
        }
    }

    /// Back to Idle from any state.
    pub fn stop(&mut self) {
        self.state = ClockState::Idle;
        self.first_cycle = false;
        self.phase = 0;
        self.sample_drift = 0;
        self.clear_masks();
    }

    /// Apply a new step grid. Takes effect immediately; callers only do this
    /// while idle or at a cycle boundary.
    pub fn configure(&mut self, step_samples: usize, cycle_length: usize) {
        self.step_samples = step_samples.max(1);
        self.cycle_length = cycle_length.clamp(1, Self::MAX_STEPS);
    }

    /// Close the current cycle.
    ///
    /// Clears all masks and reports whether this was the first cycle since
    /// arming.
    pub fn finish_cycle(&mut self) -> bool {
        self.clear_masks();
        self.cycles_completed += 1;
        std::mem::replace(&mut self.first_cycle, false)
    }

    /// Start the next cycle on a (possibly new) grid.
    pub fn restart(&mut self, step_samples: usize, cycle_length: usize) {
        self.configure(step_samples, cycle_length);
        self.phase = 0;
        self.state = ClockState::Running;
    }

    fn clear_masks(&mut self) {
        self.transcription.clear();
        self.playback.clear();
        self.display.clear();
    }

    // -------------------------------
    // MARK: Per-block advance
    // -------------------------------

    /// Advance by up to `frames`, never past the cycle end.
    ///
    /// Returns the number of samples actually advanced (0 while idle).
    pub fn advance(&mut self, frames: usize) -> usize {
        match self.state {
            ClockState::Idle => return 0,
            ClockState::Armed => self.state = ClockState::Running,
            ClockState::Running => {}
        }
        let step = frames.min(self.cycle_end().saturating_sub(self.phase));
        self.phase += step;
        step
    }

    /// Fire every due one-shot, in step order per sweep.
    pub fn sweep(&mut self, mut on_step: impl FnMut(StepFire)) {
        if self.state != ClockState::Running {
            return;
        }
        let phase2 = 2 * self.phase;
        for step in 0..self.cycle_length {
            let half_point = (2 * step + 1) * self.step_samples;
            if phase2 > half_point && !self.transcription.is_executed(step) {
                self.transcription.set_executed(step);
                on_step(StepFire {
                    sweep: Sweep::Transcription,
                    step,
                });
            }
        }
        for step in 0..self.cycle_length {
            if self.phase >= step * self.step_samples && !self.playback.is_executed(step) {
                self.playback.set_executed(step);
                on_step(StepFire {
                    sweep: Sweep::Playback,
                    step,
                });
            }
        }
        for step in 0..self.cycle_length {
            let half_point = (2 * step + 1) * self.step_samples;
            if phase2 > half_point && !self.display.is_executed(step) {
                self.display.set_executed(step);
                on_step(StepFire {
                    sweep: Sweep::Display,
                    step,
                });
            }
        }
    }

    #[inline]
    pub fn at_cycle_end(&self) -> bool {
        self.state == ClockState::Running && self.phase >= self.cycle_end()
    }

    /// Cycle length in samples including drift correction.
    #[inline]
    pub fn cycle_end(&self) -> usize {
        let nominal = (self.step_samples * self.cycle_length) as i64;
        (nominal + self.sample_drift).max(1) as usize
    }

    #[inline]
    pub fn set_drift(&mut self, drift: i64) {
        self.sample_drift = drift;
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn state(&self) -> ClockState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != ClockState::Idle
    }

    #[inline]
    pub fn is_first_cycle(&self) -> bool {
        self.first_cycle
    }

    #[inline]
    pub fn phase(&self) -> usize {
        self.phase
    }

    #[inline]
    pub fn step_samples(&self) -> usize {
        self.step_samples
    }

    #[inline]
    pub fn cycle_length(&self) -> usize {
        self.cycle_length
    }

    #[inline]
    pub fn sample_drift(&self) -> i64 {
        self.sample_drift
    }

    #[inline]
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn mask(&self, sweep: Sweep) -> StepMask {
        match sweep {
            Sweep::Transcription => self.transcription,
            Sweep::Playback => self.playback,
            Sweep::Display => self.display,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run one full cycle in `block`-sized advances, counting fires per step.
    fn run_cycle(clock: &mut PhaseClock, block: usize) -> [[u32; 32]; 3] {
        let mut counts = [[0u32; 32]; 3];
        while !clock.at_cycle_end() {
            clock.advance(block);
            clock.sweep(|fire| {
                let sweep = match fire.sweep {
                    Sweep::Transcription => 0,
                    Sweep::Playback => 1,
                    Sweep::Display => 2,
                };
                counts[sweep][fire.step] += 1;
            });
        }
        counts
    }

    #[test]
    fn test_idle_clock_does_not_advance() {
        let mut clock = PhaseClock::new(100, 4);
        assert_eq!(clock.advance(64), 0);
        let mut fired = false;
        clock.sweep(|_| fired = true);
        assert!(!fired);
    }

    #[test]
    fn test_each_step_fires_once_per_sweep() {
        let mut clock = PhaseClock::new(1000, 8);
        clock.arm();
        let counts = run_cycle(&mut clock, 256);
        for sweep in counts {
            assert!(sweep[..8].iter().all(|&c| c == 1), "{sweep:?}");
            assert!(sweep[8..].iter().all(|&c| c == 0));
        }
        assert!(clock.mask(Sweep::Playback).all_executed(8));
    }

    #[test]
    fn test_masks_clear_at_cycle_boundary() {
        let mut clock = PhaseClock::new(500, 32);
        clock.arm();
        run_cycle(&mut clock, 512);
        assert!(clock.finish_cycle());
        for sweep in [Sweep::Transcription, Sweep::Playback, Sweep::Display] {
            let mask = clock.mask(sweep);
            assert!((0..32).all(|step| !mask.is_executed(step)));
        }
        assert!(!clock.is_first_cycle());

        clock.restart(500, 32);
        let counts = run_cycle(&mut clock, 512);
        assert!(counts[1].iter().all(|&c| c == 1));
        assert!(!clock.finish_cycle());
        assert_eq!(clock.cycles_completed(), 2);
    }

    #[test]
    fn test_advance_stops_at_cycle_end() {
        let mut clock = PhaseClock::new(100, 2);
        clock.arm();
        assert_eq!(clock.advance(150), 150);
        assert_eq!(clock.advance(150), 50);
        assert!(clock.at_cycle_end());
        assert_eq!(clock.advance(150), 0);
    }

    #[test]
    fn test_transcription_waits_for_half_step() {
        let mut clock = PhaseClock::new(100, 4);
        clock.arm();
        clock.advance(50);
        let mut fires = Vec::new();
        clock.sweep(|fire| fires.push(fire));
        // Playback of step 0 fires at phase 0; transcription needs phase > 50.
        assert_eq!(
            fires,
            vec![StepFire {
                sweep: Sweep::Playback,
                step: 0
            }]
        );

        clock.advance(1);
        fires.clear();
        clock.sweep(|fire| fires.push(fire));
        assert!(fires.contains(&StepFire {
            sweep: Sweep::Transcription,
            step: 0
        }));
    }

    #[test]
    fn test_drift_extends_cycle() {
        let mut clock = PhaseClock::new(100, 4);
        clock.arm();
        clock.set_drift(-3);
        assert_eq!(clock.cycle_end(), 397);
        clock.set_drift(5);
        assert_eq!(clock.cycle_end(), 405);
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let mut clock = PhaseClock::new(100, 4);
        clock.arm();
        clock.advance(120);
        clock.sweep(|_| {});
        clock.stop();
        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(clock.phase(), 0);
        assert_eq!(clock.mask(Sweep::Playback).bits(), 0);
    }
}
