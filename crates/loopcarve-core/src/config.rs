use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    export::{ExportMode, ExportOptions, OtOverflow, PREVIEW_CHUNK_FRAMES},
    report::ReportFormat,
};

pub const CONFIG_FILE_NAME: &str = "loopcarve.config.toml";
pub const CONFIG_PATH_ENV: &str = "LOOPCARVE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopcarveConfig {
    pub engine: EngineConfig,
    pub export: ExportConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Decoder library to load; the platform's default name when unset.
    pub library_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    pub chunk_frames: usize,
    pub report_format: ReportFormat,
    pub ot_overflow: OtOverflow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub log_dir: PathBuf,
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_frames: PREVIEW_CHUNK_FRAMES,
            report_format: ReportFormat::Csv,
            ot_overflow: OtOverflow::Truncate,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            rust_log_filter: "info,loopcarve_core=debug".to_string(),
            trace_file_prefix: "loopcarve".to_string(),
        }
    }
}

impl ExportConfig {
    #[must_use]
    pub fn options(&self, mode: ExportMode) -> ExportOptions {
        ExportOptions {
            mode,
            report_format: self.report_format,
            chunk_frames: self.chunk_frames.max(1),
            ot_overflow: self.ot_overflow,
        }
    }
}

impl LoopcarveConfig {
    /// Loads the discovered config file, or defaults when there is none.
    pub fn load() -> Result<Self> {
        match discover_config_path()? {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("no {CONFIG_FILE_NAME} found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config: LoopcarveConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");

        Ok(config)
    }
}

fn discover_config_path() -> Result<Option<PathBuf>> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    Ok(candidates.into_iter().find(|path| path.is_file()))
}
