use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::audio_buffer::ChannelBuffer;

/// Copy of the display grain handed to the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrainSnapshot {
    pub channels: usize,
    pub frames: usize,

    /// Planar samples: `channels` runs of `frames`
    pub samples: Vec<f32>,
}

impl GrainSnapshot {
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.samples[start..start + self.frames]
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Lock-free double buffer for the display grain.
///
/// Single producer (audio thread)
/// Any number of readers (UI threads)
///
/// Samples are stored as f32 bits. A reader racing a publish can see a mix of
/// two grains; that is acceptable for display.
pub struct SnapshotHandoff {
    buffers: [Box<[AtomicU32]>; 2],
    frames: [AtomicUsize; 2],
    channels: usize,
    capacity: usize,

    /// Index currently visible to readers
    read_index: AtomicUsize,
}

impl SnapshotHandoff {
    pub fn new(channels: usize, capacity: usize) -> Self {
        let channels = channels.max(1);
        let buffer = || {
            (0..channels * capacity)
                .map(|_| AtomicU32::new(0))
                .collect::<Box<[AtomicU32]>>()
        };
        Self {
            buffers: [buffer(), buffer()],
            frames: [AtomicUsize::new(0), AtomicUsize::new(0)],
            channels,
            capacity,
            read_index: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write `grain` into the buffer readers are not using and flip.
    ///
    /// Producer-only. Frames beyond capacity are dropped.
    pub fn publish(&self, grain: &ChannelBuffer) {
        let read = self.read_index.load(Ordering::Relaxed);
        let write = 1 - read;
        let frames = grain.frames().min(self.capacity);
        let buffer = &self.buffers[write];

        for ch in 0..self.channels {
            let src = grain.channel(ch.min(grain.channels() - 1));
            let dst = &buffer[ch * self.capacity..ch * self.capacity + frames];
            for (slot, sample) in dst.iter().zip(src) {
                slot.store(sample.to_bits(), Ordering::Relaxed);
            }
        }
        self.frames[write].store(frames, Ordering::Relaxed);
        self.read_index.store(write, Ordering::Release);
    }

    /// Copy the most recently published grain.
    pub fn read(&self) -> GrainSnapshot {
        let index = self.read_index.load(Ordering::Acquire);
        let frames = self.frames[index].load(Ordering::Relaxed);
        let buffer = &self.buffers[index];

        let mut samples = Vec::with_capacity(self.channels * frames);
        for ch in 0..self.channels {
            let run = &buffer[ch * self.capacity..ch * self.capacity + frames];
            samples.extend(run.iter().map(|s| f32::from_bits(s.load(Ordering::Relaxed))));
        }
        GrainSnapshot {
            channels: self.channels,
            frames,
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grain(frames: usize, value: f32) -> ChannelBuffer {
        let mut buffer = ChannelBuffer::new(2, frames);
        buffer.channel_mut(0).fill(value);
        buffer.channel_mut(1).fill(-value);
        buffer
    }

    #[test]
    fn test_empty_before_publish() {
        let handoff = SnapshotHandoff::new(2, 16);
        assert!(handoff.read().is_empty());
    }

    #[test]
    fn test_publish_then_read() {
        let handoff = SnapshotHandoff::new(2, 16);
        handoff.publish(&grain(8, 0.5));
        let snapshot = handoff.read();
        assert_eq!(snapshot.frames, 8);
        assert_eq!(snapshot.channel(0), &[0.5; 8]);
        assert_eq!(snapshot.channel(1), &[-0.5; 8]);

        handoff.publish(&grain(4, 0.25));
        let snapshot = handoff.read();
        assert_eq!(snapshot.frames, 4);
        assert_eq!(snapshot.channel(0), &[0.25; 4]);
    }

    #[test]
    fn test_oversized_grain_is_truncated() {
        let handoff = SnapshotHandoff::new(1, 4);
        handoff.publish(&grain(10, 1.0));
        assert_eq!(handoff.read().frames, 4);
    }
}
