use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    model::LoopLayout,
    persistence,
    time::{frames_to_seconds, pulses_to_seconds},
};

pub const REPORT_COLUMNS: [&str; 7] = [
    "slice",
    "ppq_position",
    "ppq_offset_s",
    "frame_offset",
    "frames",
    "duration_s",
    "running_total_s",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    Tsv,
}

impl ReportFormat {
    #[must_use]
    pub fn delimiter(self) -> &'static str {
        match self {
            Self::Csv => ",",
            Self::Tsv => "\t",
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportRow {
    pub index: u32,
    pub ppq_position: u64,
    /// Offset implied by the slice's pulse position.
    pub ppq_offset_seconds: f64,
    pub frame_offset: u64,
    pub frames: u64,
    pub duration_seconds: f64,
    /// Sum of the durations of all preceding rows.
    pub running_total_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportTotal {
    pub ppq_length: u64,
    pub ppq_length_seconds: f64,
    pub frames: u64,
    pub duration_seconds: f64,
}

/// Per-slice timing laid out as one contiguous timeline in slice order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingReport {
    pub rows: Vec<ReportRow>,
    pub total: ReportTotal,
}

impl TimingReport {
    #[must_use]
    pub fn from_layout(layout: &LoopLayout) -> Self {
        let info = layout.info();
        let tempo_bpm = info.tempo_bpm();

        let mut running_total = 0.0;
        let mut rows = Vec::with_capacity(layout.placements().len());
        for placement in layout.placements() {
            let slice = placement.slice;
            let duration = frames_to_seconds(slice.frames, info.sample_rate);
            rows.push(ReportRow {
                index: slice.index,
                ppq_position: slice.ppq_position,
                ppq_offset_seconds: pulses_to_seconds(slice.ppq_position, tempo_bpm),
                frame_offset: placement.frame_offset,
                frames: slice.frames,
                duration_seconds: duration,
                running_total_seconds: running_total,
            });
            running_total += duration;
        }

        Self {
            rows,
            total: ReportTotal {
                ppq_length: info.ppq_length,
                ppq_length_seconds: info.pulse_length_seconds(),
                frames: layout.total_frames(),
                duration_seconds: running_total,
            },
        }
    }

    #[must_use]
    pub fn render(&self, format: ReportFormat) -> String {
        let delimiter = format.delimiter();
        let join = |fields: &[String]| {
            let mut line = fields.join(delimiter);
            line.push('\n');
            line
        };

        let mut out = join(&REPORT_COLUMNS.map(str::to_string));
        for row in &self.rows {
            out.push_str(&join(&[
                row.index.to_string(),
                row.ppq_position.to_string(),
                seconds(row.ppq_offset_seconds),
                row.frame_offset.to_string(),
                row.frames.to_string(),
                seconds(row.duration_seconds),
                seconds(row.running_total_seconds),
            ]));
        }

        let total = &self.total;
        out.push_str(&join(&[
            "total".to_string(),
            total.ppq_length.to_string(),
            seconds(total.ppq_length_seconds),
            String::new(),
            total.frames.to_string(),
            seconds(total.duration_seconds),
            seconds(total.duration_seconds),
        ]));
        out
    }
}

fn seconds(value: f64) -> String {
    format!("{value:.6}")
}

#[instrument(skip(report), fields(path = %path.display(), format = ?format, rows = report.rows.len()))]
pub fn write_report(path: &Path, report: &TimingReport, format: ReportFormat) -> Result<u64> {
    let text = report.render(format);
    let written = persistence::write_atomic(path, text.as_bytes())
        .with_context(|| format!("failed to write timing report: {}", path.display()))?;
    info!(bytes = written, "timing report written");
    Ok(written)
}
