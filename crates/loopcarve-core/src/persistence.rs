use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

/// Writes `bytes` to `path` through a sibling temporary file.
///
/// The destination only appears once every byte has been written and
/// flushed; on any failure the temporary file is removed and `path` is left
/// untouched.
#[instrument(skip(bytes), fields(path = %path.display(), len = bytes.len()))]
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create directory: {}", parent.display()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    temp_file
        .write_all(bytes)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    temp_file
        .as_file()
        .sync_all()
        .with_context(|| format!("failed to flush temp file for {}", path.display()))?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist file: {}", path.display()))?;

    debug!("file persisted");
    Ok(bytes.len() as u64)
}
