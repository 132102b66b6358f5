// src/capture.rs
//
// Per-cycle recording of the raw input.

use std::ops::Range;

use crate::audio_buffer::{AudioBuffer, ChannelBuffer};

/// Records one cycle of input, all channels.
///
/// The buffer is sized once per cycle (at the boundary) and then only
/// written into; writes past capacity are dropped.
#[derive(Debug, Default)]
pub struct InputCapture {
    buffer: ChannelBuffer,
    written: usize,
}

impl InputCapture {
    pub fn new(channels: usize) -> Self {
        Self {
            buffer: ChannelBuffer::new(channels, 0),
            written: 0,
        }
    }

    /// Clear and resize for the next cycle.
    pub fn reset(&mut self, channels: usize, frames: usize) {
        self.buffer.resize(channels, frames);
        self.written = 0;
    }

    /// Append `range` of the input block. Returns how many frames were kept.
    pub fn push(&mut self, input: &AudioBuffer, range: Range<usize>) -> usize {
        let take = range.len().min(self.remaining());
        if take == 0 {
            return 0;
        }
        let dst_start = self.written;
        for ch in 0..self.buffer.channels() {
            let src_ch = ch.min(input.channels - 1);
            let src = &input.channel(src_ch)[range.start..range.start + take];
            self.buffer.channel_mut(ch)[dst_start..dst_start + take].copy_from_slice(src);
        }
        self.written += take;
        take
    }

    /// Copy up to `len` frames starting at `start` into `dst`.
    ///
    /// Only frames that were actually recorded are copied; `dst` is sized to
    /// what was available (possibly zero).
    pub fn copy_span(&self, start: usize, len: usize, dst: &mut ChannelBuffer) -> usize {
        let available = self.written.saturating_sub(start).min(len);
        dst.resize(self.buffer.channels(), available);
        if available == 0 {
            return 0;
        }
        for ch in 0..self.buffer.channels() {
            dst.channel_mut(ch)
                .copy_from_slice(&self.buffer.channel(ch)[start..start + available]);
        }
        available
    }

    #[inline]
    pub fn written(&self) -> usize {
        self.written
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.frames()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.written
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.written >= self.capacity()
    }

    /// The recorded frames so far, per channel.
    pub fn recorded(&self, ch: usize) -> &[f32] {
        &self.buffer.channel(ch)[..self.written]
    }
}
