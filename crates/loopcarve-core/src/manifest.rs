use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::{
    export::{ExportMode, ExportOutcome, OutputKind},
    model::LoopInfo,
    persistence,
};

const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub kind: OutputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<u32>,
    /// Name relative to the manifest's output directory.
    pub file_name: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub input: String,
    pub mode: ExportMode,
    pub loop_info: LoopInfo,
    pub outputs: Vec<ManifestEntry>,
    pub skipped_slices: Vec<u32>,
    pub warnings: Vec<String>,
}

/// Hashes every file the export wrote, reading them back from disk.
#[instrument(skip(outcome), fields(input = %input.display(), outputs = outcome.written.len()))]
pub fn build_manifest(input: &Path, outcome: &ExportOutcome) -> Result<ExportManifest> {
    let mut outputs = Vec::with_capacity(outcome.written.len());
    for file in &outcome.written {
        let bytes = fs::read(&file.path)
            .with_context(|| format!("failed to read exported file: {}", file.path.display()))?;
        outputs.push(ManifestEntry {
            kind: file.kind,
            slice: file.slice,
            file_name: display_name(&file.path),
            size_bytes: bytes.len() as u64,
            sha256: hash_hex(&bytes),
        });
    }

    Ok(ExportManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        input: display_name(input),
        mode: outcome.mode,
        loop_info: outcome.loop_info,
        outputs,
        skipped_slices: outcome.skipped_slices.clone(),
        warnings: outcome.warnings.clone(),
    })
}

pub fn read_manifest(path: &Path) -> Result<ExportManifest> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read export manifest: {}", path.display()))?;
    let manifest: ExportManifest =
        serde_json::from_slice(&bytes).context("failed to parse export manifest json")?;
    Ok(manifest)
}

#[instrument(skip(manifest), fields(path = %path.display(), outputs = manifest.outputs.len()))]
pub fn write_manifest(path: &Path, manifest: &ExportManifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest).context("failed to encode export manifest json")?;
    persistence::write_atomic(path, &json)
        .with_context(|| format!("failed to write export manifest: {}", path.display()))?;
    info!("export manifest written");
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

fn hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
