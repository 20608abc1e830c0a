use serde::{Deserialize, Serialize};

use crate::{
    ot::OtSlice,
    time::{frames_to_seconds, pulses_to_seconds, seconds_per_pulse},
};

/// Global properties of a decoded loop, as reported by the decoder engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub slice_count: u32,
    /// Tempo in thousandths of a beat per minute.
    pub tempo_milli_bpm: u32,
    pub ppq_length: u64,
}

impl LoopInfo {
    #[must_use]
    pub fn tempo_bpm(&self) -> f64 {
        f64::from(self.tempo_milli_bpm) / 1_000.0
    }

    #[must_use]
    pub fn seconds_per_pulse(&self) -> f64 {
        seconds_per_pulse(self.tempo_bpm())
    }

    #[must_use]
    pub fn pulse_length_seconds(&self) -> f64 {
        pulses_to_seconds(self.ppq_length, self.tempo_bpm())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate is zero".to_string());
        }
        if !(1..=2).contains(&self.channels) {
            return Err(format!(
                "unsupported channel count {} (expected 1 or 2)",
                self.channels
            ));
        }
        if self.tempo_milli_bpm == 0 {
            return Err("tempo is zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceInfo {
    pub index: u32,
    /// Nominal position inside the loop. Not guaranteed to be ordered.
    pub ppq_position: u64,
    pub frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicePlacement {
    pub slice: SliceInfo,
    /// Frames of all preceding known slices, in index order.
    pub frame_offset: u64,
}

/// The loop's slices concatenated in index order.
///
/// Slices whose info could not be read are listed in `missing` and take no
/// room on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopLayout {
    info: LoopInfo,
    placements: Vec<SlicePlacement>,
    missing: Vec<u32>,
    total_frames: u64,
}

impl LoopLayout {
    #[must_use]
    pub fn new(info: LoopInfo, slices: Vec<SliceInfo>, missing: Vec<u32>) -> Self {
        let mut placements = Vec::with_capacity(slices.len());
        let mut cursor = 0_u64;
        for slice in slices {
            placements.push(SlicePlacement {
                slice,
                frame_offset: cursor,
            });
            cursor = cursor.saturating_add(slice.frames);
        }

        Self {
            info,
            placements,
            missing,
            total_frames: cursor,
        }
    }

    #[must_use]
    pub fn info(&self) -> &LoopInfo {
        &self.info
    }

    #[must_use]
    pub fn placements(&self) -> &[SlicePlacement] {
        &self.placements
    }

    #[must_use]
    pub fn missing(&self) -> &[u32] {
        &self.missing
    }

    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    #[must_use]
    pub fn total_seconds(&self) -> f64 {
        frames_to_seconds(self.total_frames, self.info.sample_rate)
    }

    /// Start/length pairs for the slice table, or `None` once any slice
    /// leaves the 32-bit frame range.
    #[must_use]
    pub fn ot_slices(&self) -> Option<Vec<OtSlice>> {
        self.placements
            .iter()
            .map(|placement| {
                Some(OtSlice {
                    start: u32::try_from(placement.frame_offset).ok()?,
                    length: u32::try_from(placement.slice.frames).ok()?,
                })
            })
            .collect()
    }
}
