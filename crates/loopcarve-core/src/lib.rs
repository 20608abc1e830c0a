pub mod bytes;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod export;
pub mod fixtures;
pub mod manifest;
pub mod model;
pub mod ot;
pub mod pcm;
pub mod persistence;
pub mod report;
pub mod time;
pub mod wav;

pub use config::LoopcarveConfig;
pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_with_options};
pub use engine::{
    DecoderEngine, EngineError, LoopDecoder, PreviewSession,
    rex::RexEngine,
    synthetic::{SyntheticEngine, SyntheticLoop},
};
pub use export::{
    ExportError, ExportMode, ExportOptions, ExportOutcome, OtOverflow, OutputKind, OutputTarget,
    WrittenFile, export_container, run_export,
};
pub use manifest::{ExportManifest, build_manifest, read_manifest, write_manifest};
pub use model::{LoopInfo, LoopLayout, SliceInfo};
pub use ot::{OtError, OtParams, OtSlice, OtSliceTable, encode_ot};
pub use pcm::{PcmBuffer, PlanarBuffer, interleave_pcm16, sample_to_i16};
pub use report::{ReportFormat, TimingReport};
pub use wav::encode_wav;
