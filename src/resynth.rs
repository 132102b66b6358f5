// src/resynth.rs
//
// Granular resynthesis of the voice grain.
//
// Each generated note resamples the grain to the target pitch and plays the
// result as a "tile". Before a tile runs out, a fresh tile (slightly
// detuned) is crossfaded onto the rest of it, so a held note becomes a
// continuous texture instead of a repeating loop.

use crate::audio_buffer::ChannelBuffer;
use crate::dsp::{AdsrEnvelope, EnvelopeStage};
use crate::isolator::VoiceGrain;

// ═══════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════

/// Entries in each jitter table.
pub const JITTER_TABLE_SIZE: usize = 512;

/// Splice point as a fraction of the tile length.
const OFFSET_MIN: f32 = 0.08;
const OFFSET_MAX: f32 = 0.17;

/// Per-splice detune in semitones.
const DETUNE_MIN: f32 = -0.10;
const DETUNE_MAX: f32 = 0.11;

/// Widest downward shift a tile can ever need, in semitones.
///
/// Pitch class difference (-11), octave (-4 * 12), detune (-1) and splice
/// jitter, rounded out.
const MAX_DOWN_SHIFT: f64 = 61.0;

// ═══════════════════════════════════════════════════════════════════
// Pitch math
// ═══════════════════════════════════════════════════════════════════

/// Semitone shift that takes the grain from `voice_note` to `target`.
///
/// Only the pitch classes matter; register comes from `octave`.
#[inline]
pub fn shift_interval(target: u8, voice_note: u8, octave: i8, detune: f32) -> f32 {
    let classes = (target % 12) as i32 - (voice_note % 12) as i32;
    classes as f32 + 12.0 * octave as f32 + detune
}

#[inline]
pub fn pitch_ratio(interval: f32) -> f64 {
    2.0_f64.powf(interval as f64 / 12.0)
}

/// Output length of a resample by `ratio`.
#[inline]
pub fn resampled_len(frames: usize, ratio: f64) -> usize {
    if !(ratio > 0.0) || !ratio.is_finite() {
        return 0;
    }
    (frames as f64 / ratio).round().max(0.0) as usize
}

/// Largest tile any shift of a `frames`-long grain can produce.
#[inline]
pub fn max_tile_frames(frames: usize) -> usize {
    (frames as f64 * 2.0_f64.powf(MAX_DOWN_SHIFT / 12.0)).ceil() as usize + 1
}

/// Linear-interpolation resample of `src` by `ratio` into `dst`.
///
/// `dst` must already have capacity for the result; its length is clamped to
/// what it can hold. Returns the number of frames written.
pub fn resample(src: &ChannelBuffer, ratio: f64, dst: &mut ChannelBuffer) -> usize {
    let src_len = src.frames();
    let len = if src_len == 0 {
        0
    } else {
        resampled_len(src_len, ratio)
    };
    dst.set_frames(len);
    let len = dst.frames();
    if len == 0 {
        return 0;
    }

    let last = src_len - 1;
    for ch in 0..dst.channels() {
        let input = src.channel(ch.min(src.channels() - 1));
        let out = dst.channel_mut(ch);
        for (i, sample) in out.iter_mut().enumerate() {
            let pos = i as f64 * ratio;
            let index = (pos as usize).min(last);
            let frac = if index == last {
                0.0
            } else {
                (pos - index as f64) as f32
            };
            let a = input[index];
            let b = input[(index + 1).min(last)];
            *sample = a + (b - a) * frac;
        }
    }
    len
}

/// Crossfade `next` onto the unplayed part of `current` (from `cursor`).
///
/// The overlap is the shorter of the two; any tail of `next` past the overlap
/// is appended as-is. The result always has `next`'s length.
pub fn crossfade_splice(
    current: &ChannelBuffer,
    cursor: usize,
    next: &ChannelBuffer,
    out: &mut ChannelBuffer,
) -> usize {
    let remainder = current.frames().saturating_sub(cursor);
    let overlap = remainder.min(next.frames());
    out.set_frames(next.frames());
    let len = out.frames();

    for ch in 0..out.channels() {
        let old = &current.channel(ch.min(current.channels() - 1))[cursor.min(current.frames())..];
        let new = next.channel(ch.min(next.channels() - 1));
        let dst = out.channel_mut(ch);

        for i in 0..overlap.min(len) {
            let fade_in = i as f32 / overlap as f32;
            let fade_out = 1.0 - fade_in;
            dst[i] = old[i] * fade_out + new[i] * fade_in;
        }
        if len > overlap {
            dst[overlap..len].copy_from_slice(&new[overlap..len]);
        }
    }
    len
}

// ═══════════════════════════════════════════════════════════════════
// Jitter tables
// ═══════════════════════════════════════════════════════════════════

/// Pre-drawn splice offsets and detunes, read cyclically.
#[derive(Debug, Clone)]
pub struct JitterTables {
    offsets: Vec<f32>,
    detunes: Vec<f32>,
    offset_index: usize,
    detune_index: usize,
}

impl JitterTables {
    pub fn new(seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let offsets = (0..JITTER_TABLE_SIZE)
            .map(|_| OFFSET_MIN + rng.f32() * (OFFSET_MAX - OFFSET_MIN))
            .collect();
        let detunes = (0..JITTER_TABLE_SIZE)
            .map(|_| DETUNE_MIN + rng.f32() * (DETUNE_MAX - DETUNE_MIN))
            .collect();
        Self {
            offsets,
            detunes,
            offset_index: 0,
            detune_index: 0,
        }
    }

    #[inline]
    pub fn next_offset(&mut self) -> f32 {
        let value = self.offsets[self.offset_index];
        self.offset_index = (self.offset_index + 1) % JITTER_TABLE_SIZE;
        value
    }

    #[inline]
    pub fn next_detune(&mut self) -> f32 {
        let value = self.detunes[self.detune_index];
        self.detune_index = (self.detune_index + 1) % JITTER_TABLE_SIZE;
        value
    }

    pub fn rewind(&mut self) {
        self.offset_index = 0;
        self.detune_index = 0;
    }
}

// ═══════════════════════════════════════════════════════════════════
// Resynthesizer
// ═══════════════════════════════════════════════════════════════════

pub struct GrainResynthesizer {
    /// Tile being played
    active: ChannelBuffer,
    cursor: usize,
    splice_at: usize,
    playing: bool,

    /// Shift of the current note before splice jitter
    interval: f32,
    sounding_note: Option<u8>,

    /// Scratch for freshly resampled and freshly spliced tiles
    next: ChannelBuffer,
    spliced: ChannelBuffer,

    /// Release-only path used when playback is stopped mid-tile
    tail: ChannelBuffer,
    tail_cursor: usize,

    flicker: AdsrEnvelope,
    tail_envelope: AdsrEnvelope,

    tables: JitterTables,
}

impl GrainResynthesizer {
    pub fn new(channels: usize, sample_rate: f32, seed: u64) -> Self {
        Self {
            active: ChannelBuffer::new(channels, 0),
            cursor: 0,
            splice_at: 0,
            playing: false,
            interval: 0.0,
            sounding_note: None,
            next: ChannelBuffer::new(channels, 0),
            spliced: ChannelBuffer::new(channels, 0),
            tail: ChannelBuffer::new(channels, 0),
            tail_cursor: 0,
            flicker: AdsrEnvelope::gate(sample_rate, 0.0),
            tail_envelope: AdsrEnvelope::gate(sample_rate, 0.0),
            tables: JitterTables::new(seed),
        }
    }

    /// Make room for every tile a grain of `grain_frames` can produce.
    ///
    /// Called at construction and cycle boundaries only; nothing else here
    /// allocates.
    pub fn reserve(&mut self, grain_frames: usize) {
        let frames = max_tile_frames(grain_frames);
        for buffer in [
            &mut self.active,
            &mut self.next,
            &mut self.spliced,
            &mut self.tail,
        ] {
            if buffer.capacity_frames() < frames {
                let keep = buffer.frames();
                let mut grown = ChannelBuffer::new(buffer.channels(), 0);
                grown.reserve_frames(frames);
                grown.set_frames(keep);
                for ch in 0..grown.channels() {
                    grown.channel_mut(ch).copy_from_slice(buffer.channel(ch));
                }
                *buffer = grown;
            }
        }
    }

    /// Envelope release time, one step.
    pub fn set_release(&mut self, seconds: f32) {
        self.flicker.configure(0.0, 0.0, 1.0, seconds);
        self.tail_envelope.configure(0.0, 0.0, 1.0, seconds);
    }

    // -------------------------------
    // MARK: Step events
    // -------------------------------

    /// Start `note` from the top of a freshly shifted tile.
    pub fn trigger(&mut self, grain: &VoiceGrain, note: u8, octave: i8, detune: f32) {
        self.interval = shift_interval(note, grain.voice_note, octave, detune);
        self.sounding_note = Some(note);
        self.cursor = 0;

        let len = resample(&grain.buffer, pitch_ratio(self.interval), &mut self.active);
        self.playing = len > 0;
        self.splice_at = self.splice_point(len);
        self.flicker.note_on();
    }

    /// Go silent until the next trigger.
    pub fn silence(&mut self) {
        self.playing = false;
        self.sounding_note = None;
        self.active.set_frames(0);
        self.cursor = 0;
        self.flicker.reset();
    }

    /// Start the flicker release; it runs while the tile keeps playing.
    pub fn release(&mut self) {
        self.flicker.note_off();
    }

    /// Hand the sounding tile to the tail path and fade it out.
    pub fn stop(&mut self) {
        if self.playing {
            std::mem::swap(&mut self.active, &mut self.tail);
            self.tail_cursor = self.cursor;
            self.tail_envelope.release_from(self.flicker.level());
        }
        self.playing = false;
        self.sounding_note = None;
        self.active.set_frames(0);
        self.cursor = 0;
        self.flicker.reset();
    }

    pub fn reset(&mut self) {
        self.stop();
        self.tail.set_frames(0);
        self.tail_cursor = 0;
        self.tail_envelope.reset();
        self.tables.rewind();
    }

    // -------------------------------
    // MARK: Rendering
    // -------------------------------

    /// Add this block's grain output into `wet`.
    pub fn render(&mut self, grain: &VoiceGrain, wet: &mut ChannelBuffer) {
        self.render_tail(wet);

        let frames = wet.frames();
        let mut offset = 0;
        while offset < frames && self.playing {
            if self.cursor >= self.active.frames() {
                self.playing = false;
                break;
            }
            if self.cursor >= self.splice_at {
                self.splice(grain);
                continue;
            }

            let run = (frames - offset)
                .min(self.active.frames() - self.cursor)
                .min(self.splice_at - self.cursor);
            add_scaled(
                &self.active,
                self.cursor,
                wet,
                offset,
                run,
                &mut self.flicker,
            );
            self.cursor += run;
            offset += run;
        }
    }

    fn render_tail(&mut self, wet: &mut ChannelBuffer) {
        if !self.tail_envelope.is_active() {
            return;
        }
        let run = wet.frames().min(self.tail.frames().saturating_sub(self.tail_cursor));
        add_scaled(
            &self.tail,
            self.tail_cursor,
            wet,
            0,
            run,
            &mut self.tail_envelope,
        );
        self.tail_cursor += run;
        if self.tail_cursor >= self.tail.frames() {
            self.tail_envelope.reset();
        }
    }

    fn splice(&mut self, grain: &VoiceGrain) {
        let detune = self.tables.next_detune();
        let len = resample(
            &grain.buffer,
            pitch_ratio(self.interval + detune),
            &mut self.next,
        );
        if len == 0 {
            self.playing = false;
            return;
        }
        let len = crossfade_splice(&self.active, self.cursor, &self.next, &mut self.spliced);
        std::mem::swap(&mut self.active, &mut self.spliced);
        self.cursor = 0;
        self.splice_at = self.splice_point(len);
    }

    fn splice_point(&mut self, len: usize) -> usize {
        ((len as f32 * self.tables.next_offset()) as usize).max(1)
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Note currently sounding (cleared by a rest or stop).
    #[inline]
    pub fn sounding_note(&self) -> Option<u8> {
        self.sounding_note
    }

    #[inline]
    pub fn interval(&self) -> f32 {
        self.interval
    }

    #[inline]
    pub fn tile_frames(&self) -> usize {
        self.active.frames()
    }

    #[inline]
    pub fn is_tail_active(&self) -> bool {
        self.tail_envelope.is_active()
    }

    /// Stage of the note-boundary envelope on the main path.
    #[inline]
    pub fn flicker_stage(&self) -> EnvelopeStage {
        self.flicker.stage()
    }
}

/// Add `frames` of `src` from `src_start` into `dst` from `dst_start`, one
/// envelope gain per frame shared across channels.
fn add_scaled(
    src: &ChannelBuffer,
    src_start: usize,
    dst: &mut ChannelBuffer,
    dst_start: usize,
    frames: usize,
    envelope: &mut AdsrEnvelope,
) {
    let channels = dst.channels().min(src.channels());
    for i in 0..frames {
        let gain = envelope.next_gain();
        for ch in 0..channels {
            dst.channel_mut(ch)[dst_start + i] += src.channel(ch)[src_start + i] * gain;
        }
    }
}
