//! In-process decoder engine whose "container" is a JSON loop description.
//!
//! Each slice renders a sine tone, so output is deterministic and the same
//! frames come back whether a slice is rendered on its own or through the
//! preview stream. Faults can be injected per call to exercise recovery
//! paths, and lifecycle counters expose whether handles were released.

use std::{cell::Cell, f32::consts::TAU};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DecoderEngine, EngineError, LoopDecoder, PreviewStage};
use crate::{
    model::{LoopInfo, SliceInfo},
    pcm::PlanarBuffer,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticLoop {
    pub sample_rate: u32,
    pub channels: u16,
    pub tempo_milli_bpm: u32,
    pub ppq_length: u64,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    pub slices: Vec<SyntheticSlice>,
    #[serde(default)]
    pub faults: SyntheticFaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticSlice {
    pub ppq_position: u64,
    pub frames: u64,
    pub frequency_hz: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyntheticFaults {
    pub loop_info: bool,
    pub slice_info: Vec<u32>,
    pub render_slice: Vec<u32>,
    /// Zero-based preview chunk whose render call fails.
    pub preview_chunk: Option<usize>,
}

fn default_amplitude() -> f32 {
    0.5
}

impl SyntheticLoop {
    pub fn to_container(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_container(bytes: &[u8]) -> Result<Self, EngineError> {
        let parsed: Self = serde_json::from_slice(bytes)
            .map_err(|error| EngineError::Open(format!("invalid synthetic loop: {error}")))?;
        Ok(parsed)
    }

    fn sample(&self, slice: &SyntheticSlice, frame: u64, channel: usize) -> f32 {
        let phase = frame as f32 / self.sample_rate.max(1) as f32 * slice.frequency_hz * TAU;
        let value = phase.sin() * self.amplitude;
        if channel == 0 { value } else { -value }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleCounts {
    pub opened: usize,
    pub closed: usize,
    pub previews_started: usize,
    pub previews_stopped: usize,
    pub slices_rendered: usize,
    pub preview_chunks: usize,
}

#[derive(Debug, Default)]
pub struct SyntheticEngine {
    counts: Cell<LifecycleCounts>,
}

impl SyntheticEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn counts(&self) -> LifecycleCounts {
        self.counts.get()
    }

    fn bump(&self, update: impl FnOnce(&mut LifecycleCounts)) {
        let mut counts = self.counts.get();
        update(&mut counts);
        self.counts.set(counts);
    }
}

impl DecoderEngine for SyntheticEngine {
    type Loop<'e> = SyntheticDecoder<'e>;

    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open<'e>(&'e self, container: &[u8]) -> Result<SyntheticDecoder<'e>, EngineError> {
        let desc = SyntheticLoop::from_container(container)?;
        let mut offsets = Vec::with_capacity(desc.slices.len());
        let mut cursor = 0_u64;
        for slice in &desc.slices {
            offsets.push(cursor);
            cursor = cursor.saturating_add(slice.frames);
        }

        self.bump(|counts| counts.opened += 1);
        debug!(slices = desc.slices.len(), total_frames = cursor, "synthetic loop opened");
        Ok(SyntheticDecoder {
            engine: self,
            desc,
            offsets,
            preview: None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PreviewCursor {
    frame: u64,
    chunk: usize,
}

pub struct SyntheticDecoder<'e> {
    engine: &'e SyntheticEngine,
    desc: SyntheticLoop,
    offsets: Vec<u64>,
    preview: Option<PreviewCursor>,
}

impl SyntheticDecoder<'_> {
    fn loop_sample(&self, frame: u64, channel: usize) -> f32 {
        let slot = self.offsets.partition_point(|&offset| offset <= frame);
        let Some(index) = slot.checked_sub(1) else {
            return 0.0;
        };
        let slice = &self.desc.slices[index];
        let local = frame - self.offsets[index];
        if local < slice.frames {
            self.desc.sample(slice, local, channel)
        } else {
            0.0
        }
    }
}

impl Drop for SyntheticDecoder<'_> {
    fn drop(&mut self) {
        self.engine.bump(|counts| counts.closed += 1);
    }
}

impl LoopDecoder for SyntheticDecoder<'_> {
    fn loop_info(&self) -> Result<LoopInfo, EngineError> {
        if self.desc.faults.loop_info {
            return Err(EngineError::LoopInfo("injected fault".to_string()));
        }

        Ok(LoopInfo {
            sample_rate: self.desc.sample_rate,
            channels: self.desc.channels,
            slice_count: self.desc.slices.len() as u32,
            tempo_milli_bpm: self.desc.tempo_milli_bpm,
            ppq_length: self.desc.ppq_length,
        })
    }

    fn slice_info(&self, index: u32) -> Result<SliceInfo, EngineError> {
        if self.desc.faults.slice_info.contains(&index) {
            return Err(EngineError::SliceInfo {
                index,
                reason: "injected fault".to_string(),
            });
        }

        let slice = self
            .desc
            .slices
            .get(index as usize)
            .ok_or_else(|| EngineError::SliceInfo {
                index,
                reason: "invalid slice".to_string(),
            })?;
        Ok(SliceInfo {
            index,
            ppq_position: slice.ppq_position,
            frames: slice.frames,
        })
    }

    fn render_slice(&mut self, index: u32, output: &mut PlanarBuffer) -> Result<(), EngineError> {
        if self.desc.faults.render_slice.contains(&index) {
            return Err(EngineError::RenderSlice {
                index,
                reason: "injected fault".to_string(),
            });
        }

        let slice = self
            .desc
            .slices
            .get(index as usize)
            .ok_or_else(|| EngineError::RenderSlice {
                index,
                reason: "invalid slice".to_string(),
            })?;
        for (channel, samples) in output.channels_mut().enumerate() {
            for (frame, sample) in samples.iter_mut().enumerate() {
                let frame = frame as u64;
                *sample = if frame < slice.frames {
                    self.desc.sample(slice, frame, channel)
                } else {
                    0.0
                };
            }
        }

        self.engine.bump(|counts| counts.slices_rendered += 1);
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), EngineError> {
        if self.preview.is_some() {
            return Err(EngineError::Preview {
                stage: PreviewStage::Start,
                reason: "loop is being previewed".to_string(),
            });
        }

        self.preview = Some(PreviewCursor { frame: 0, chunk: 0 });
        self.engine.bump(|counts| counts.previews_started += 1);
        Ok(())
    }

    fn render_preview_chunk(&mut self, output: &mut PlanarBuffer) -> Result<(), EngineError> {
        let failed = |reason: &str| EngineError::Preview {
            stage: PreviewStage::Render,
            reason: reason.to_string(),
        };
        let cursor = self.preview.ok_or_else(|| failed("loop is not being previewed"))?;
        if self.desc.faults.preview_chunk == Some(cursor.chunk) {
            return Err(failed("injected fault"));
        }

        let frames = output.frames() as u64;
        let mut rendered = PlanarBuffer::new(output.channel_count(), output.frames())
            .map_err(|error| failed(&error.to_string()))?;
        for (channel, samples) in rendered.channels_mut().enumerate() {
            for (offset, sample) in samples.iter_mut().enumerate() {
                *sample = self.loop_sample(cursor.frame + offset as u64, channel);
            }
        }
        *output = rendered;

        self.preview = Some(PreviewCursor {
            frame: cursor.frame + frames,
            chunk: cursor.chunk + 1,
        });
        self.engine.bump(|counts| counts.preview_chunks += 1);
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), EngineError> {
        if self.preview.take().is_none() {
            return Err(EngineError::Preview {
                stage: PreviewStage::Stop,
                reason: "loop is not being previewed".to_string(),
            });
        }

        self.engine.bump(|counts| counts.previews_stopped += 1);
        Ok(())
    }
}
