// src/melody.rs
//
// Counter-melody generation.

use crate::event::{GeneratedMelody, MELODY_SLOTS, StepEvent};

/// Lowest note of the generated register (middle C); `key` is added to it.
pub const ROOT_NOTE: u8 = 60;

/// Step stride per density setting 1..=6 (smaller stride = denser).
const DENSITY_STRIDES: [usize; 6] = [32, 16, 8, 4, 2, 1];

/// Interval sets the generator draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    #[default]
    Major,
    HarmonicMajor,
    Pentatonic,
    Chromatic,
}

impl Scale {
    /// Map the 1-based `scale` parameter onto a scale.
    pub fn from_selector(selector: u8) -> Self {
        match selector {
            0 | 1 => Scale::Major,
            2 => Scale::HarmonicMajor,
            3 => Scale::Pentatonic,
            _ => Scale::Chromatic,
        }
    }

    pub fn selector(self) -> u8 {
        match self {
            Scale::Major => 1,
            Scale::HarmonicMajor => 2,
            Scale::Pentatonic => 3,
            Scale::Chromatic => 4,
        }
    }

    pub fn intervals(self) -> &'static [u8] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::HarmonicMajor => &[0, 2, 4, 5, 7, 8, 11],
            Scale::Pentatonic => &[0, 2, 4, 7, 9],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

/// Stride between populated slots for a density setting.
#[inline]
pub fn density_stride(density: u8) -> usize {
    let index = (density.clamp(1, DENSITY_STRIDES.len() as u8) - 1) as usize;
    DENSITY_STRIDES[index]
}

/// Builds one cycle's counter-melody.
///
/// Randomness comes from a free-running generator: seeded once, never
/// re-seeded, so a fixed seed gives a reproducible sequence of melodies.
pub struct MelodyGenerator {
    rng: fastrand::Rng,
}

impl MelodyGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Fill a melody: `Hold` everywhere, a random scale note every
    /// `density_stride(density)` slots starting at slot 0.
    pub fn generate(&mut self, key: u8, scale: Scale, density: u8) -> GeneratedMelody {
        let root = ROOT_NOTE + key.min(11);
        let intervals = scale.intervals();
        let stride = density_stride(density);

        let mut melody = GeneratedMelody::filled(StepEvent::Hold);
        if intervals.is_empty() {
            return melody;
        }
        for step in (0..MELODY_SLOTS).step_by(stride) {
            let interval = intervals[self.rng.usize(..intervals.len())];
            melody.set(step, StepEvent::Note(root + interval));
        }
        melody
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALES: [Scale; 4] = [
        Scale::Major,
        Scale::HarmonicMajor,
        Scale::Pentatonic,
        Scale::Chromatic,
    ];

    #[test]
    fn test_notes_stay_in_key_and_scale() {
        let mut generator = MelodyGenerator::new(7);
        for scale in SCALES {
            for key in 0..12 {
                for density in 1..=6 {
                    let melody = generator.generate(key, scale, density);
                    assert_eq!(melody.len(), MELODY_SLOTS);
                    for event in melody.iter() {
                        if let StepEvent::Note(note) = event {
                            let interval = note - (ROOT_NOTE + key);
                            assert!(scale.intervals().contains(&interval));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_density_one_populates_only_first_slot() {
        let mut generator = MelodyGenerator::new(1);
        for _ in 0..20 {
            let melody = generator.generate(3, Scale::Pentatonic, 1);
            assert_eq!(melody.note_steps().collect::<Vec<_>>(), vec![0]);
            assert!(melody.iter().skip(1).all(|e| e == StepEvent::Hold));
        }
    }

    #[test]
    fn test_density_six_populates_every_slot() {
        let mut generator = MelodyGenerator::new(2);
        let melody = generator.generate(0, Scale::Major, 6);
        assert_eq!(melody.note_steps().count(), MELODY_SLOTS);
    }

    #[test]
    fn test_strides() {
        let populated: Vec<usize> = (1..=6)
            .map(|d| MelodyGenerator::new(0).generate(0, Scale::Chromatic, d).note_steps().count())
            .collect();
        assert_eq!(populated, vec![1, 2, 4, 8, 16, 32]);
        assert_eq!(density_stride(0), 32);
        assert_eq!(density_stride(9), 1);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = MelodyGenerator::new(42);
        let mut b = MelodyGenerator::new(42);
        for _ in 0..4 {
            assert_eq!(
                a.generate(5, Scale::Chromatic, 5),
                b.generate(5, Scale::Chromatic, 5)
            );
        }
    }

    #[test]
    fn test_selector_round_trip() {
        for scale in SCALES {
            assert_eq!(Scale::from_selector(scale.selector()), scale);
        }
    }
}
