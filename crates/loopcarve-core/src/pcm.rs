use thiserror::Error;

/// Full-scale multiplier for 16-bit output. Positive and negative peaks map
/// symmetrically to +/-32767; -32768 is never produced.
pub const PCM16_SCALE: f32 = 32_767.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PcmError {
    #[error("unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannels(usize),
    #[error("{len} samples do not divide into {channels} interleaved channels")]
    Misaligned { len: usize, channels: u16 },
}

/// Converts one normalized sample to 16-bit PCM.
///
/// The value is clamped to `[-1.0, 1.0]`, scaled by 32767 and truncated
/// toward zero. NaN becomes silence.
#[must_use]
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16
}

/// Per-channel float frames as handed out to, and filled by, the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl PlanarBuffer {
    pub fn new(channel_count: usize, frames: usize) -> Result<Self, PcmError> {
        if !(1..=2).contains(&channel_count) {
            return Err(PcmError::UnsupportedChannels(channel_count));
        }

        Ok(Self {
            channels: vec![vec![0.0; frames]; channel_count],
            frames,
        })
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    /// Changes the frame count, zeroing every sample. Used when the final
    /// preview chunk is shorter than the rest.
    pub fn reset(&mut self, frames: usize) {
        self.frames = frames;
        for channel in &mut self.channels {
            channel.clear();
            channel.resize(frames, 0.0);
        }
    }

    #[must_use]
    pub fn to_pcm16(&self) -> PcmBuffer {
        let left = &self.channels[0];
        let right = self.channels.get(1).map(Vec::as_slice);
        interleave_pcm16(left, right)
    }
}

/// Interleaved signed 16-bit samples. The sample count is always a whole
/// number of frames for the stored channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    samples: Vec<i16>,
    channels: u16,
}

impl PcmBuffer {
    pub fn new(channels: u16) -> Result<Self, PcmError> {
        Self::with_capacity(channels, 0)
    }

    pub fn with_capacity(channels: u16, frames: usize) -> Result<Self, PcmError> {
        if !(1..=2).contains(&channels) {
            return Err(PcmError::UnsupportedChannels(usize::from(channels)));
        }

        Ok(Self {
            samples: Vec::with_capacity(frames * usize::from(channels)),
            channels,
        })
    }

    pub fn from_interleaved(samples: Vec<i16>, channels: u16) -> Result<Self, PcmError> {
        if !(1..=2).contains(&channels) {
            return Err(PcmError::UnsupportedChannels(usize::from(channels)));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(PcmError::Misaligned {
                len: samples.len(),
                channels,
            });
        }

        Ok(Self { samples, channels })
    }

    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Converts and appends every frame of `planar`.
    pub fn append_planar(&mut self, planar: &PlanarBuffer) -> Result<(), PcmError> {
        if planar.channel_count() != usize::from(self.channels) {
            return Err(PcmError::UnsupportedChannels(planar.channel_count()));
        }

        let chunk = planar.to_pcm16();
        self.samples.extend_from_slice(&chunk.samples);
        Ok(())
    }
}

/// Interleaves one or two channels of float samples into 16-bit PCM.
///
/// For stereo input of unequal length, only the common prefix is converted.
#[must_use]
pub fn interleave_pcm16(left: &[f32], right: Option<&[f32]>) -> PcmBuffer {
    match right {
        None => PcmBuffer {
            samples: left.iter().copied().map(sample_to_i16).collect(),
            channels: 1,
        },
        Some(right) => {
            let mut samples = Vec::with_capacity(left.len().min(right.len()) * 2);
            for (&l, &r) in left.iter().zip(right) {
                samples.push(sample_to_i16(l));
                samples.push(sample_to_i16(r));
            }
            PcmBuffer {
                samples,
                channels: 2,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_truncates_toward_zero() {
        assert_eq!(sample_to_i16(0.5), 16_383);
        assert_eq!(sample_to_i16(-0.5), -16_383);
        assert_eq!(sample_to_i16(0.000_01), 0);
        assert_eq!(sample_to_i16(-0.000_01), 0);
    }

    #[test]
    fn out_of_range_samples_clamp_to_full_scale() {
        assert_eq!(sample_to_i16(1.0), 32_767);
        assert_eq!(sample_to_i16(4.5), 32_767);
        assert_eq!(sample_to_i16(-1.0), -32_767);
        assert_eq!(sample_to_i16(-90.0), -32_767);
        assert_eq!(sample_to_i16(f32::INFINITY), 32_767);
        assert_eq!(sample_to_i16(f32::NEG_INFINITY), -32_767);
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn stereo_is_interleaved_left_first() {
        let pcm = interleave_pcm16(&[1.0, 0.0], Some(&[-1.0, 0.5]));
        assert_eq!(pcm.channels(), 2);
        assert_eq!(pcm.frames(), 2);
        assert_eq!(pcm.samples(), &[32_767, -32_767, 0, 16_383]);
    }

    #[test]
    fn mono_emits_one_sample_per_frame() {
        let pcm = interleave_pcm16(&[0.25, -0.25, 0.0], None);
        assert_eq!(pcm.channels(), 1);
        assert_eq!(pcm.samples(), &[8_191, -8_191, 0]);
        assert_eq!(pcm.byte_len(), 6);
    }

    #[test]
    fn misaligned_interleaved_input_is_rejected() {
        assert_eq!(
            PcmBuffer::from_interleaved(vec![1, 2, 3], 2),
            Err(PcmError::Misaligned {
                len: 3,
                channels: 2
            })
        );
        assert!(PcmBuffer::new(3).is_err());
        assert!(PlanarBuffer::new(0, 16).is_err());
    }

    #[test]
    fn appending_planar_chunks_concatenates_frames() {
        let mut planar = PlanarBuffer::new(2, 2).expect("stereo planar buffer");
        for channel in planar.channels_mut() {
            channel.copy_from_slice(&[0.5, -0.5]);
        }

        let mut pcm = PcmBuffer::new(2).expect("stereo pcm buffer");
        pcm.append_planar(&planar).expect("first chunk");
        planar.reset(1);
        pcm.append_planar(&planar).expect("second chunk");

        assert_eq!(pcm.frames(), 3);
        assert_eq!(pcm.samples(), &[16_383, 16_383, -16_383, -16_383, 0, 0]);
    }
}
