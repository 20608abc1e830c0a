//! Canonical 44-byte-header RIFF/WAVE encoding for 16-bit integer PCM.

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, instrument};

use crate::{bytes::LittleEndianWriter, pcm::PcmBuffer, persistence};

pub const WAV_HEADER_LEN: usize = 44;
pub const BITS_PER_SAMPLE: u16 = 16;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_TAG_PCM: u16 = 1;
const RIFF_OVERHEAD: u32 = 36;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WavError {
    #[error("pcm payload of {0} bytes exceeds the RIFF size limit")]
    TooLarge(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl WavFormat {
    #[must_use]
    pub fn block_align(&self) -> u16 {
        self.channels * (BITS_PER_SAMPLE / 8)
    }

    #[must_use]
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(u32::from(self.block_align()))
    }
}

/// Serializes `pcm` into a complete WAV file image.
pub fn encode_wav(pcm: &PcmBuffer, sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let format = WavFormat {
        sample_rate,
        channels: pcm.channels(),
    };
    let data_len = u32::try_from(pcm.byte_len())
        .ok()
        .filter(|len| len.checked_add(RIFF_OVERHEAD).is_some())
        .ok_or(WavError::TooLarge(pcm.byte_len()))?;

    let mut writer = LittleEndianWriter::with_capacity(WAV_HEADER_LEN + pcm.byte_len());
    writer.tag(b"RIFF").u32(RIFF_OVERHEAD + data_len).tag(b"WAVE");

    writer
        .tag(b"fmt ")
        .u32(FMT_CHUNK_LEN)
        .u16(FORMAT_TAG_PCM)
        .u16(format.channels)
        .u32(format.sample_rate)
        .u32(format.byte_rate())
        .u16(format.block_align())
        .u16(BITS_PER_SAMPLE);

    writer.tag(b"data").u32(data_len).i16_slice(pcm.samples());

    Ok(writer.into_bytes())
}

/// Encodes `pcm` and writes it to `path`, returning the file size.
#[instrument(skip(pcm), fields(path = %path.display(), frames = pcm.frames(), channels = pcm.channels()))]
pub fn write_wav_file(path: &Path, pcm: &PcmBuffer, sample_rate: u32) -> Result<u64> {
    let bytes = encode_wav(pcm, sample_rate)
        .with_context(|| format!("failed to encode wav file: {}", path.display()))?;
    let written = persistence::write_atomic(path, &bytes)
        .with_context(|| format!("failed to write wav file: {}", path.display()))?;
    info!(bytes = written, "wav written");
    Ok(written)
}
