// src/event.rs
//
// Per-step symbols shared by transcription, generation and playback.

/// Number of step slots in both captured and generated melodies.
pub const MELODY_SLOTS: usize = 32;

/// What the playback sweep does when it reaches a step.
///
/// These events:
/// - are RT-safe (`Copy`, no heap)
/// - are produced once per cycle by the melody generator
/// - are consumed exactly once per cycle by the playback sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepEvent {
    /// Silence the grain path.
    #[default]
    Rest,

    /// Keep whatever is sounding; no new trigger.
    Hold,

    /// Start a new grain at this MIDI note.
    Note(u8),
}

impl StepEvent {
    #[inline]
    pub fn note(self) -> Option<u8> {
        match self {
            StepEvent::Note(note) => Some(note),
            _ => None,
        }
    }

    /// True for events that end whatever the previous step started.
    #[inline]
    pub fn interrupts(self) -> bool {
        !matches!(self, StepEvent::Hold)
    }
}

/// Notes detected during the current cycle, one slot per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedMelody {
    slots: [Option<u8>; MELODY_SLOTS],
}

impl Default for CapturedMelody {
    fn default() -> Self {
        Self {
            slots: [None; MELODY_SLOTS],
        }
    }
}

impl CapturedMelody {
    pub fn from_slots(slots: [Option<u8>; MELODY_SLOTS]) -> Self {
        Self { slots }
    }

    #[inline]
    pub fn set(&mut self, step: usize, note: Option<u8>) {
        if let Some(slot) = self.slots.get_mut(step) {
            *slot = note;
        }
    }

    #[inline]
    pub fn get(&self, step: usize) -> Option<u8> {
        self.slots.get(step).copied().flatten()
    }

    #[inline]
    pub fn slots(&self) -> &[Option<u8>; MELODY_SLOTS] {
        &self.slots
    }

    pub fn clear(&mut self) {
        self.slots = [None; MELODY_SLOTS];
    }
}

/// The counter-melody for the next cycle, one event per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedMelody {
    events: [StepEvent; MELODY_SLOTS],
}

impl Default for GeneratedMelody {
    /// A silent melody: every step rests.
    fn default() -> Self {
        Self {
            events: [StepEvent::Rest; MELODY_SLOTS],
        }
    }
}

impl GeneratedMelody {
    pub fn filled(event: StepEvent) -> Self {
        Self {
            events: [event; MELODY_SLOTS],
        }
    }

    #[inline]
    pub fn get(&self, step: usize) -> StepEvent {
        self.events.get(step).copied().unwrap_or(StepEvent::Rest)
    }

    #[inline]
    pub fn set(&mut self, step: usize, event: StepEvent) {
        if let Some(slot) = self.events.get_mut(step) {
            *slot = event;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = StepEvent> + '_ {
        self.events.iter().copied()
    }

    /// Indices of steps that trigger a new note.
    pub fn note_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.note().is_some())
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_steps_are_ignored() {
        let mut captured = CapturedMelody::default();
        captured.set(40, Some(60));
        assert_eq!(captured.get(40), None);

        let melody = GeneratedMelody::filled(StepEvent::Hold);
        assert_eq!(melody.get(32), StepEvent::Rest);
    }

    #[test]
    fn test_note_steps() {
        let mut melody = GeneratedMelody::filled(StepEvent::Hold);
        melody.set(0, StepEvent::Note(60));
        melody.set(16, StepEvent::Note(67));
        assert_eq!(melody.note_steps().collect::<Vec<_>>(), vec![0, 16]);
        assert!(StepEvent::Rest.interrupts());
        assert!(!StepEvent::Hold.interrupts());
    }
}
