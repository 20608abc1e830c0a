//! Slice-map container for the Octatrack sampler (`.ot`).
//!
//! The file accompanies a WAV of the same base name. Every multi-byte field
//! is big-endian and the layout is fixed at [`OT_FILE_LEN`] bytes:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 23 | header (`FORM`, zero length, `DPS1SMPA`, reserved, version) |
//! | 23 | 4 | tempo (BPM x 24) |
//! | 27 | 4 | trim length (bars x 25) |
//! | 31 | 4 | loop length (bars x 25) |
//! | 35 | 8 | stretch, loop mode (zero) |
//! | 43 | 2 | gain (48) |
//! | 45 | 1 | quantize (255) |
//! | 46 | 12 | trim start (0), trim end (total frames), loop point (0) |
//! | 58 | 768 | 64 x (start, end, length) |
//! | 826 | 4 | slice count |
//! | 830 | 2 | checksum |

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, instrument};

use crate::{bytes::BigEndianWriter, persistence};

pub const OT_SLICE_CAPACITY: usize = 64;
pub const OT_FILE_LEN: usize = 832;
pub const OT_TEMPO_OFFSET: usize = 23;
pub const OT_SLICE_TABLE_OFFSET: usize = 58;
pub const OT_SLICE_COUNT_OFFSET: usize = 826;
pub const OT_CHECKSUM_OFFSET: usize = 830;
pub const CHECKSUM_START: usize = 16;

// FORM length is left at zero. Unverified whether the device reads it.
const OT_HEADER: [u8; OT_TEMPO_OFFSET] = *b"FORM\0\0\0\0DPS1SMPA\0\0\0\0\0\x02\0";
const TEMPO_UNITS_PER_BPM: u32 = 24;
const BAR_LENGTH_UNITS: u32 = 25;
const GAIN_NEUTRAL: u16 = 48;
const QUANTIZE_DIRECT: u8 = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtError {
    #[error("{count} slices exceed the 64-entry slice table")]
    TooManySlices { count: usize },
    #[error("slice {index} ends beyond the 32-bit frame range")]
    SliceOutOfRange { index: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtSlice {
    pub start: u32,
    pub length: u32,
}

/// Fixed 64-slot table. Slots past `len` are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtSliceTable {
    entries: [OtSlice; OT_SLICE_CAPACITY],
    len: usize,
}

impl OtSliceTable {
    pub fn from_slices(slices: &[OtSlice]) -> Result<Self, OtError> {
        if slices.len() > OT_SLICE_CAPACITY {
            return Err(OtError::TooManySlices {
                count: slices.len(),
            });
        }

        let mut entries = [OtSlice::default(); OT_SLICE_CAPACITY];
        for (index, (slot, slice)) in entries.iter_mut().zip(slices).enumerate() {
            if slice.start.checked_add(slice.length).is_none() {
                return Err(OtError::SliceOutOfRange { index });
            }
            *slot = *slice;
        }

        Ok(Self {
            entries,
            len: slices.len(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn entries(&self) -> &[OtSlice; OT_SLICE_CAPACITY] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtParams {
    pub sample_rate: u32,
    pub tempo_bpm: u32,
    pub total_frames: u32,
}

/// Loop length in the device's bar unit: whole bars rounded, times 25.
#[must_use]
pub fn bar_length(tempo_bpm: u32, total_frames: u32, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }

    let beats = f64::from(tempo_bpm) * f64::from(total_frames) / (f64::from(sample_rate) * 60.0);
    (beats.round() as u32).saturating_mul(BAR_LENGTH_UNITS)
}

/// Sum of `bytes` modulo 2^16.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0_u16, |sum, &byte| sum.wrapping_add(u16::from(byte)))
}

#[must_use]
pub fn encode_ot(table: &OtSliceTable, params: &OtParams) -> Vec<u8> {
    let length = bar_length(params.tempo_bpm, params.total_frames, params.sample_rate);

    let mut writer = BigEndianWriter::with_capacity(OT_FILE_LEN);
    writer
        .raw(&OT_HEADER)
        .u32(params.tempo_bpm.saturating_mul(TEMPO_UNITS_PER_BPM))
        .u32(length)
        .u32(length)
        .u32(0)
        .u32(0)
        .u16(GAIN_NEUTRAL)
        .u8(QUANTIZE_DIRECT)
        .u32(0)
        .u32(params.total_frames)
        .u32(0);

    for slice in table.entries() {
        writer
            .u32(slice.start)
            .u32(slice.start + slice.length)
            .u32(slice.length);
    }
    writer.u32(table.len() as u32);

    let sum = checksum(&writer.as_slice()[CHECKSUM_START..]);
    writer.u16(sum);
    writer.into_bytes()
}

#[instrument(skip(table), fields(path = %path.display(), slices = table.len(), tempo_bpm = params.tempo_bpm))]
pub fn write_ot_file(path: &Path, table: &OtSliceTable, params: &OtParams) -> Result<u64> {
    let bytes = encode_ot(table, params);
    let written = persistence::write_atomic(path, &bytes)
        .with_context(|| format!("failed to write ot file: {}", path.display()))?;
    info!(bytes = written, "ot written");
    Ok(written)
}
