// src/audio_buffer.rs
//
// Planar audio storage: a borrowed view for host blocks and an owned
// buffer for everything the engine keeps between blocks.

/// Borrowed planar block: `channels` contiguous runs of `frames` samples.
#[derive(Debug)]
pub struct AudioBuffer<'a> {
    pub channels: usize,
    pub frames: usize,
    pub data: &'a mut [f32], // planar: [ch0 frames..][ch1 frames..]
}

impl<'a> AudioBuffer<'a> {
    /// Create a new AudioBuffer wrapping existing data.
    #[inline]
    pub fn new(data: &'a mut [f32], channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = data.len() / channels;
        Self {
            channels,
            frames,
            data,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Get direct access to the planar sample data.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        self.data
    }
}

/// Owned planar buffer.
///
/// Capacity only grows in `resize`/`reserve_frames`; `set_frames` within
/// the reserved capacity never allocates, which is what the audio thread
/// relies on between cycle boundaries.
#[derive(Debug, Clone, Default)]
pub struct ChannelBuffer {
    channels: usize,
    frames: usize,
    /// Frames reserved per channel (stride between channel runs).
    stride: usize,
    data: Vec<f32>,
}

impl ChannelBuffer {
    pub fn new(channels: usize, frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            frames,
            stride: frames,
            data: vec![0.0; channels * frames],
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Resize to `frames` per channel and zero the contents.
    ///
    /// Allocates when `frames` exceeds the reserved capacity.
    pub fn resize(&mut self, channels: usize, frames: usize) {
        let channels = channels.max(1);
        if channels != self.channels || frames > self.stride {
            self.channels = channels;
            self.stride = frames.max(self.stride);
            self.data.clear();
            self.data.resize(self.channels * self.stride, 0.0);
        }
        self.frames = frames;
        self.clear();
    }

    /// Reserve room for at least `frames` per channel, keeping nothing.
    pub fn reserve_frames(&mut self, frames: usize) {
        if frames > self.stride {
            let channels = self.channels;
            self.resize(channels, frames);
            self.frames = 0;
        }
    }

    /// Change the logical length without touching samples.
    ///
    /// `frames` is clamped to the reserved capacity.
    #[inline]
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.stride);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.stride;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.stride;
        &mut self.data[start..start + self.frames]
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        (0..self.channels)
            .flat_map(|ch| self.channel(ch).iter())
            .fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    /// Multiply every sample by `gain`.
    pub fn scale(&mut self, gain: f32) {
        for ch in 0..self.channels {
            for s in self.channel_mut(ch) {
                *s *= gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_channels_are_planar() {
        let mut data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buffer = AudioBuffer::new(&mut data, 2);
        assert_eq!(buffer.frames, 3);
        assert_eq!(buffer.channel(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_set_frames_within_capacity_keeps_allocation() {
        let mut buffer = ChannelBuffer::new(2, 0);
        buffer.reserve_frames(128);
        let ptr = buffer.channel(0).as_ptr();

        buffer.set_frames(64);
        assert_eq!(buffer.frames(), 64);
        assert_eq!(buffer.channel(0).as_ptr(), ptr);

        buffer.set_frames(1000);
        assert_eq!(buffer.frames(), 128);
    }

    #[test]
    fn test_peak_and_scale() {
        let mut buffer = ChannelBuffer::new(2, 4);
        buffer.channel_mut(0)[1] = 0.25;
        buffer.channel_mut(1)[3] = -0.5;
        assert_eq!(buffer.peak(), 0.5);

        buffer.scale(2.0);
        assert_eq!(buffer.peak(), 1.0);
        assert_eq!(buffer.channel(0)[1], 0.5);
    }
}
