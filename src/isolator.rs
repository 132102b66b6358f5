// src/isolator.rs
//
// End-of-cycle voice isolation.
//
// Finds a stretch of the cycle where the performer held one note, cuts
// that region out of the capture, and turns it into a faded, normalized
// grain tagged with the note it was sung at.

use crate::audio_buffer::ChannelBuffer;
use crate::capture::InputCapture;
use crate::event::CapturedMelody;
use crate::pitch::ANALYSIS_WINDOW;

/// A run must be longer than this many equal notes to be considered stable.
const MIN_RUN_EXCLUSIVE: usize = 5;

/// Elements kept from the start of a stable run.
const MID_RES_LEN: usize = 5;

/// Middle elements of the mid-res chunk that become the grain.
const HI_RES_START: usize = 1;
const HI_RES_LEN: usize = 3;

/// Samples per index unit when mapping the chosen range onto the capture.
const UNIT_SAMPLES: usize = ANALYSIS_WINDOW;

/// Longest grain isolation can produce.
pub const MAX_GRAIN_FRAMES: usize = HI_RES_LEN * UNIT_SAMPLES;

/// Fraction of the grain spent fading in (and, symmetrically, out).
const FADE_FRACTION: f32 = 0.31;

/// The performer's timbre, ready for resynthesis.
#[derive(Debug, Clone, Default)]
pub struct VoiceGrain {
    pub buffer: ChannelBuffer,

    /// MIDI note the grain was captured at
    pub voice_note: u8,
}

impl VoiceGrain {
    pub fn new(channels: usize) -> Self {
        let mut buffer = ChannelBuffer::new(channels, 0);
        buffer.reserve_frames(MAX_GRAIN_FRAMES);
        Self {
            buffer,
            voice_note: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.buffer.frames()
    }
}

/// Index range (inclusive) of a stable run plus the note chosen from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrainRegion {
    /// Low-res chunk: the whole stable run
    pub run: (usize, usize),

    /// Hi-res chunk: the slots that become the grain
    pub first: usize,
    pub len: usize,

    pub voice_note: u8,
}

impl GrainRegion {
    /// Sample span of the region inside the capture.
    #[inline]
    pub fn sample_range(&self) -> (usize, usize) {
        (self.first * UNIT_SAMPLES, self.len * UNIT_SAMPLES)
    }
}

/// First run of more than five consecutive equal detected notes.
///
/// Slots without a detection never form a run.
pub fn find_stable_run(slots: &[Option<u8>]) -> Option<(usize, usize)> {
    let mut start = 0;
    while start < slots.len() {
        let Some(note) = slots[start] else {
            start += 1;
            continue;
        };
        let len = slots[start..]
            .iter()
            .take_while(|slot| **slot == Some(note))
            .count();
        if len > MIN_RUN_EXCLUSIVE {
            return Some((start, start + len - 1));
        }
        start += len;
    }
    None
}

/// Narrow a captured melody down to the grain region (low -> mid -> hi res).
pub fn locate_region(melody: &CapturedMelody) -> Option<GrainRegion> {
    let slots = melody.slots();
    let run = find_stable_run(slots)?;

    let mid_first = run.0;
    debug_assert!(run.1 - run.0 + 1 >= MID_RES_LEN);

    let first = mid_first + HI_RES_START;
    let voice_note = slots[first + 1]?;

    Some(GrainRegion {
        run,
        first,
        len: HI_RES_LEN,
        voice_note,
    })
}

/// Linear fade in over the first 31%, out over the last 31%.
pub fn apply_bell_fade(buffer: &mut ChannelBuffer) {
    let frames = buffer.frames();
    let fade = (frames as f32 * FADE_FRACTION) as usize;
    if fade == 0 {
        return;
    }
    for ch in 0..buffer.channels() {
        let samples = buffer.channel_mut(ch);
        for i in 0..fade {
            let gain = i as f32 / fade as f32;
            samples[i] *= gain;
            samples[frames - 1 - i] *= gain;
        }
    }
}

/// Scale so the loudest sample across channels sits at 1.0.
pub fn normalize_peak(buffer: &mut ChannelBuffer) {
    let peak = buffer.peak();
    if peak > 0.0 {
        buffer.scale(1.0 / peak);
    }
}

/// Runs isolation at the end of every cycle.
#[derive(Debug, Default)]
pub struct VoiceIsolator {
    scratch: ChannelBuffer,
}

impl VoiceIsolator {
    pub fn new(channels: usize) -> Self {
        let mut scratch = ChannelBuffer::new(channels, 0);
        scratch.reserve_frames(MAX_GRAIN_FRAMES);
        Self { scratch }
    }

    /// Try to replace `grain` with a fresh one from this cycle's capture.
    ///
    /// On failure (no stable run, or nothing recorded in the region) `grain`
    /// is left untouched and `None` is returned.
    pub fn isolate(
        &mut self,
        melody: &CapturedMelody,
        capture: &InputCapture,
        grain: &mut VoiceGrain,
    ) -> Option<GrainRegion> {
        let region = locate_region(melody)?;
        let (start, len) = region.sample_range();

        if capture.copy_span(start, len, &mut self.scratch) == 0 {
            return None;
        }
        apply_bell_fade(&mut self.scratch);
        normalize_peak(&mut self.scratch);

        std::mem::swap(&mut grain.buffer, &mut self.scratch);
        grain.voice_note = region.voice_note;
        Some(region)
    }
}
