use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    engine::{DecoderEngine, EngineError, LoopDecoder, PreviewSession},
    model::{LoopInfo, LoopLayout},
    ot::{OT_SLICE_CAPACITY, OtParams, OtSliceTable, write_ot_file},
    pcm::{PcmBuffer, PlanarBuffer},
    report::{ReportFormat, TimingReport, write_report},
    time::{durations_agree, pulses_to_frames},
    wav::write_wav_file,
};

/// Frames requested per preview call when rendering the whole loop.
pub const PREVIEW_CHUNK_FRAMES: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// One WAV per slice.
    Slices,
    /// One WAV of the whole loop.
    Loop,
    /// Whole-loop WAV plus an `.ot` slice map beside it.
    LoopWithOt,
}

impl ExportMode {
    #[must_use]
    pub fn writes_ot(self) -> bool {
        matches!(self, Self::LoopWithOt)
    }
}

/// What to do when a loop has more slices than the OT table holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtOverflow {
    /// Keep the first 64 slices.
    #[default]
    Truncate,
    /// Skip the OT output.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub mode: ExportMode,
    pub report_format: ReportFormat,
    pub chunk_frames: usize,
    pub ot_overflow: OtOverflow,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            mode: ExportMode::Slices,
            report_format: ReportFormat::Csv,
            chunk_frames: PREVIEW_CHUNK_FRAMES,
            ot_overflow: OtOverflow::Truncate,
        }
    }
}

/// Output naming rooted at a path prefix such as `out/amen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    prefix: PathBuf,
}

impl OutputTarget {
    #[must_use]
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Uses `output` as the prefix, unless it names a directory (existing, or
    /// spelled with a trailing separator), in which case files are named
    /// after the input's stem inside it.
    #[must_use]
    pub fn resolve(input: &Path, output: &Path) -> Self {
        let spelled_as_dir = output
            .as_os_str()
            .to_string_lossy()
            .ends_with(std::path::is_separator);
        if output.is_dir() || spelled_as_dir {
            let stem = input
                .file_stem()
                .map_or_else(|| "loop".into(), |stem| stem.to_os_string());
            Self::new(output.join(stem))
        } else {
            Self::new(output)
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .prefix
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.prefix.with_file_name(name)
    }

    #[must_use]
    pub fn slice_wav(&self, index: u32) -> PathBuf {
        self.with_suffix(&format!("_slice_{index}.wav"))
    }

    #[must_use]
    pub fn loop_wav(&self) -> PathBuf {
        self.with_suffix(".wav")
    }

    #[must_use]
    pub fn ot(&self) -> PathBuf {
        self.with_suffix(".ot")
    }

    #[must_use]
    pub fn report(&self, format: ReportFormat) -> PathBuf {
        self.with_suffix(&format!("_info.{}", format.extension()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    SliceWav,
    LoopWav,
    Ot,
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub kind: OutputKind,
    pub slice: Option<u32>,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Result of a run that got past the fatal setup stages. Recoverable
/// failures are collected here instead of aborting the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub loop_info: LoopInfo,
    pub mode: ExportMode,
    pub written: Vec<WrittenFile>,
    pub skipped_slices: Vec<u32>,
    pub warnings: Vec<String>,
    pub report: TimingReport,
}

impl ExportOutcome {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped_slices.is_empty() && self.warnings.is_empty()
    }

    #[must_use]
    pub fn written_of(&self, kind: OutputKind) -> Vec<&WrittenFile> {
        self.written.iter().filter(|file| file.kind == kind).collect()
    }

    fn record(&mut self, kind: OutputKind, slice: Option<u32>, path: PathBuf, size_bytes: u64) {
        self.written.push(WrittenFile {
            kind,
            slice,
            path,
            size_bytes,
        });
    }

    fn warn(&mut self, message: String) {
        warn!(%message, "export continued after failure");
        self.warnings.push(message);
    }
}

/// Failures that abort a run before any output is produced.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot read input {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot open loop: {0}")]
    Open(#[source] EngineError),
    #[error("cannot query loop: {0}")]
    LoopInfo(#[source] EngineError),
    #[error("unusable loop: {0}")]
    InvalidLoop(String),
}

/// Reads `input` and exports it through `engine`.
#[instrument(skip_all, fields(engine = engine.name(), input = %input.display(), prefix = %target.prefix().display(), mode = ?options.mode))]
pub fn run_export<E: DecoderEngine>(
    engine: &E,
    input: &Path,
    target: &OutputTarget,
    options: &ExportOptions,
) -> Result<ExportOutcome, ExportError> {
    let container = fs::read(input).map_err(|source| ExportError::ReadInput {
        path: input.to_path_buf(),
        source,
    })?;
    debug!(bytes = container.len(), "loop container read");
    export_container(engine, &container, target, options)
}

/// Exports a loop container that is already in memory.
///
/// The decoder opened here is released on every return path, including the
/// fatal ones after it was opened.
#[instrument(skip_all, fields(engine = engine.name(), prefix = %target.prefix().display(), mode = ?options.mode))]
pub fn export_container<E: DecoderEngine>(
    engine: &E,
    container: &[u8],
    target: &OutputTarget,
    options: &ExportOptions,
) -> Result<ExportOutcome, ExportError> {
    let mut decoder = engine.open(container).map_err(ExportError::Open)?;
    let layout = query_layout(&decoder)?;

    // Only once the loop is known to be exportable.
    if let Some(dir) = target
        .prefix()
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        fs::create_dir_all(dir).map_err(|source| ExportError::OutputDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let info = *layout.info();
    info!(
        sample_rate = info.sample_rate,
        channels = info.channels,
        slices = info.slice_count,
        tempo_bpm = info.tempo_bpm(),
        "loop opened"
    );

    let mut outcome = ExportOutcome {
        loop_info: info,
        mode: options.mode,
        written: Vec::new(),
        skipped_slices: layout.missing().to_vec(),
        warnings: Vec::new(),
        report: TimingReport::from_layout(&layout),
    };

    match options.mode {
        ExportMode::Slices => export_slices(&mut decoder, &layout, target, &mut outcome),
        ExportMode::Loop | ExportMode::LoopWithOt => {
            export_whole_loop(&mut decoder, &layout, target, options.chunk_frames, &mut outcome);
        }
    }

    let report_path = target.report(options.report_format);
    match write_report(&report_path, &outcome.report, options.report_format) {
        Ok(size) => outcome.record(OutputKind::Report, None, report_path, size),
        Err(error) => outcome.warn(format!("{error:#}")),
    }

    if options.mode.writes_ot() {
        export_ot(&layout, target, options.ot_overflow, &mut outcome);
    }

    info!(
        written = outcome.written.len(),
        skipped = outcome.skipped_slices.len(),
        warnings = outcome.warnings.len(),
        "export finished"
    );
    Ok(outcome)
}

fn query_layout<D: LoopDecoder>(decoder: &D) -> Result<LoopLayout, ExportError> {
    let info = decoder.loop_info().map_err(ExportError::LoopInfo)?;
    info.validate().map_err(ExportError::InvalidLoop)?;

    let mut slices = Vec::with_capacity(info.slice_count as usize);
    let mut missing = Vec::new();
    for index in 0..info.slice_count {
        match decoder.slice_info(index) {
            Ok(slice) => slices.push(slice),
            Err(error) => {
                warn!(%error, index, "slice info unavailable, slice omitted");
                missing.push(index);
            }
        }
    }

    Ok(LoopLayout::new(info, slices, missing))
}

#[instrument(skip_all, fields(slices = layout.placements().len()))]
fn export_slices<D: LoopDecoder>(
    decoder: &mut D,
    layout: &LoopLayout,
    target: &OutputTarget,
    outcome: &mut ExportOutcome,
) {
    let info = layout.info();
    for placement in layout.placements() {
        let index = placement.slice.index;
        let rendered = usize::try_from(placement.slice.frames)
            .map_err(|_| format!("slice {index} is too long to render"))
            .and_then(|frames| {
                PlanarBuffer::new(usize::from(info.channels), frames).map_err(|e| e.to_string())
            })
            .and_then(|mut buffer| {
                decoder
                    .render_slice(index, &mut buffer)
                    .map(|()| buffer)
                    .map_err(|error| error.to_string())
            });

        let buffer = match rendered {
            Ok(buffer) => buffer,
            Err(message) => {
                warn!(index, %message, "slice skipped");
                outcome.skipped_slices.push(index);
                continue;
            }
        };

        let path = target.slice_wav(index);
        match write_wav_file(&path, &buffer.to_pcm16(), info.sample_rate) {
            Ok(size) => outcome.record(OutputKind::SliceWav, Some(index), path, size),
            Err(error) => outcome.warn(format!("{error:#}")),
        }
    }
}

#[instrument(skip_all, fields(slice_frames = layout.total_frames(), chunk_frames = chunk_frames))]
fn export_whole_loop<D: LoopDecoder>(
    decoder: &mut D,
    layout: &LoopLayout,
    target: &OutputTarget,
    chunk_frames: usize,
    outcome: &mut ExportOutcome,
) {
    let info = layout.info();
    let pulse_frames = pulses_to_frames(info.ppq_length, info.tempo_bpm(), info.sample_rate);
    let total_frames = if layout.missing().is_empty() {
        if !durations_agree(layout.total_seconds(), info.pulse_length_seconds()) {
            debug!(
                slice_frames = layout.total_frames(),
                pulse_frames, "slice lengths and pulse length disagree; rendering slice lengths"
            );
        }
        layout.total_frames()
    } else {
        // The preview still plays the slices whose lengths are unknown.
        let frames = pulse_frames.max(layout.total_frames());
        outcome.warn(format!(
            "slices {:?} have unknown lengths; loop length taken from its pulse length ({frames} frames)",
            layout.missing()
        ));
        frames
    };

    let pcm = match render_whole_loop(decoder, info.channels, total_frames, chunk_frames) {
        Ok(pcm) => pcm,
        Err(message) => {
            outcome.warn(format!("whole-loop render failed: {message}"));
            return;
        }
    };

    let path = target.loop_wav();
    match write_wav_file(&path, &pcm, info.sample_rate) {
        Ok(size) => outcome.record(OutputKind::LoopWav, None, path, size),
        Err(error) => outcome.warn(format!("{error:#}")),
    }
}

/// Pulls the loop through a preview session in chunks of at most
/// `chunk_frames` until `total_frames` frames are delivered.
fn render_whole_loop<D: LoopDecoder>(
    decoder: &mut D,
    channels: u16,
    total_frames: u64,
    chunk_frames: usize,
) -> Result<PcmBuffer, String> {
    let total =
        usize::try_from(total_frames).map_err(|_| "loop is too long to render".to_string())?;
    let chunk_frames = chunk_frames.max(1);

    let mut pcm = PcmBuffer::with_capacity(channels, total).map_err(|e| e.to_string())?;
    let mut chunk = PlanarBuffer::new(usize::from(channels), chunk_frames.min(total))
        .map_err(|e| e.to_string())?;

    let mut session = PreviewSession::start(decoder).map_err(|e| e.to_string())?;
    let mut delivered = 0;
    while delivered < total {
        let frames = chunk_frames.min(total - delivered);
        chunk.reset(frames);
        // Dropping the session on error stops the preview.
        session
            .render_chunk(&mut chunk)
            .map_err(|error| error.to_string())?;
        pcm.append_planar(&chunk).map_err(|e| e.to_string())?;
        delivered += frames;
        debug!(delivered, total, "preview chunk rendered");
    }

    if let Err(error) = session.finish() {
        warn!(%error, "preview did not stop cleanly; rendered audio kept");
    }
    Ok(pcm)
}

#[instrument(skip_all, fields(slices = layout.placements().len(), overflow = ?overflow))]
fn export_ot(
    layout: &LoopLayout,
    target: &OutputTarget,
    overflow: OtOverflow,
    outcome: &mut ExportOutcome,
) {
    let info = layout.info();
    if !layout.missing().is_empty() {
        outcome.warn(format!(
            "ot export skipped: slice offsets unknown after slices {:?}",
            layout.missing()
        ));
        return;
    }
    let (Some(slices), Ok(total_frames)) = (layout.ot_slices(), u32::try_from(layout.total_frames()))
    else {
        outcome.warn("ot export skipped: loop exceeds the 32-bit frame range".to_string());
        return;
    };

    let kept = match overflow {
        OtOverflow::Truncate if slices.len() > OT_SLICE_CAPACITY => {
            outcome.warn(format!(
                "ot slice table holds {OT_SLICE_CAPACITY} slices; dropped {} of {}",
                slices.len() - OT_SLICE_CAPACITY,
                slices.len()
            ));
            &slices[..OT_SLICE_CAPACITY]
        }
        _ => &slices[..],
    };
    let table = match OtSliceTable::from_slices(kept) {
        Ok(table) => table,
        Err(error) => {
            outcome.warn(format!("ot export skipped: {error}"));
            return;
        }
    };

    let params = OtParams {
        sample_rate: info.sample_rate,
        tempo_bpm: info.tempo_bpm().round() as u32,
        total_frames,
    };
    let path = target.ot();
    match write_ot_file(&path, &table, &params) {
        Ok(size) => outcome.record(OutputKind::Ot, None, path, size),
        Err(error) => outcome.warn(format!("{error:#}")),
    }
}
