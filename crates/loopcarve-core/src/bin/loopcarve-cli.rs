use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use loopcarve_core::{
    DecoderEngine, ExportMode, ExportOptions, LoopcarveConfig, OtOverflow, OutputTarget,
    ReportFormat, RexEngine, SyntheticEngine, build_manifest,
    diagnostics::init_tracing_with_options, engine::rex::DEFAULT_LIBRARY_NAME,
    fixtures::demo_loop, persistence::write_atomic, run_export, write_manifest,
};

#[derive(Debug, Parser)]
#[command(name = "loopcarve-cli")]
#[command(about = "Export sliced loops to WAV, timing reports and Octatrack slice maps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides the configured log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Config file to use instead of discovering loopcarve.config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export one loop file.
    Export {
        input: PathBuf,

        /// Output prefix, or a directory to place `<input stem>*` files in.
        output: PathBuf,

        #[arg(long, value_enum, default_value = "slices")]
        mode: ModeArg,

        #[arg(long, value_enum)]
        report_format: Option<ReportFormatArg>,

        #[arg(long, value_enum, default_value = "rex")]
        engine: EngineArg,

        #[arg(long)]
        rex_library: Option<PathBuf>,

        #[arg(long)]
        chunk_frames: Option<usize>,

        #[arg(long, value_enum)]
        ot_overflow: Option<OtOverflowArg>,

        /// Also write a JSON manifest of every exported file.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Export the built-in demo loop through the synthetic engine.
    DemoExport {
        #[arg(long, default_value = "data/exports")]
        output_dir: PathBuf,

        #[arg(long, value_enum, default_value = "loop-ot")]
        mode: ModeArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Slices,
    Loop,
    LoopOt,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormatArg {
    Csv,
    Tsv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EngineArg {
    Rex,
    Synthetic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OtOverflowArg {
    Truncate,
    Reject,
}

impl From<ModeArg> for ExportMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Slices => Self::Slices,
            ModeArg::Loop => Self::Loop,
            ModeArg::LoopOt => Self::LoopWithOt,
        }
    }
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(value: ReportFormatArg) -> Self {
        match value {
            ReportFormatArg::Csv => Self::Csv,
            ReportFormatArg::Tsv => Self::Tsv,
        }
    }
}

impl From<OtOverflowArg> for OtOverflow {
    fn from(value: OtOverflowArg) -> Self {
        match value {
            OtOverflowArg::Truncate => Self::Truncate,
            OtOverflowArg::Reject => Self::Reject,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => LoopcarveConfig::load_from(path)?,
        None => LoopcarveConfig::load()?,
    };
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| config.diagnostics.log_dir.clone());
    let telemetry = init_tracing_with_options(
        &log_dir,
        &config.diagnostics.trace_file_prefix,
        &config.diagnostics.rust_log_filter,
    )?;
    let _session = telemetry.session_span().entered();

    match cli.command {
        Commands::Export {
            input,
            output,
            mode,
            report_format,
            engine,
            rex_library,
            chunk_frames,
            ot_overflow,
            manifest,
        } => {
            let mut options = config.export.options(mode.into());
            if let Some(format) = report_format {
                options.report_format = format.into();
            }
            if let Some(frames) = chunk_frames {
                options.chunk_frames = frames.max(1);
            }
            if let Some(policy) = ot_overflow {
                options.ot_overflow = policy.into();
            }
            let target = OutputTarget::resolve(&input, &output);

            match engine {
                EngineArg::Rex => {
                    let library = rex_library
                        .or_else(|| config.engine.library_path.clone())
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_NAME));
                    let engine = RexEngine::load(&library)?;
                    export_with(&engine, &input, &target, &options, manifest.as_deref())?;
                }
                EngineArg::Synthetic => {
                    let engine = SyntheticEngine::new();
                    export_with(&engine, &input, &target, &options, manifest.as_deref())?;
                }
            }
        }
        Commands::DemoExport { output_dir, mode } => {
            let input = output_dir.join("demo.loop.json");
            let container = demo_loop()
                .to_container()
                .context("failed to encode demo loop")?;
            write_atomic(&input, &container)?;

            let engine = SyntheticEngine::new();
            let options = config.export.options(mode.into());
            let target = OutputTarget::new(output_dir.join("demo"));
            let manifest = output_dir.join("demo.manifest.json");
            export_with(&engine, &input, &target, &options, Some(manifest.as_path()))?;
        }
    }

    Ok(())
}

fn export_with<E: DecoderEngine>(
    engine: &E,
    input: &Path,
    target: &OutputTarget,
    options: &ExportOptions,
    manifest_path: Option<&Path>,
) -> anyhow::Result<()> {
    let outcome = run_export(engine, input, target, options)?;
    if !outcome.skipped_slices.is_empty() {
        tracing::warn!(skipped = ?outcome.skipped_slices, "some slices were not exported");
    }

    if let Some(path) = manifest_path {
        let manifest = build_manifest(input, &outcome)?;
        write_manifest(path, &manifest)?;
    }

    tracing::info!(
        files = outcome.written.len(),
        warnings = outcome.warnings.len(),
        prefix = %target.prefix().display(),
        "export complete"
    );
    Ok(())
}
