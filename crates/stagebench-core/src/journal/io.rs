//! Atomic write/rename helper.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::LogError;

/// Replace `path` with `content`: the old file or the new one, never a torn mix.
///
/// The staging file lives next to the target so the final rename stays on one
/// filesystem.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), LogError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut staging = tempfile::Builder::new()
        .prefix(".stagebench-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| LogError::io(dir, "create staging file in", e))?;

    write_staging(&mut staging, content).map_err(|e| LogError::io(staging.path(), "write", e))?;

    staging
        .persist(path)
        .map_err(|e| LogError::io(path, "rename staging file onto", e.error))?;
    Ok(())
}

fn write_staging(staging: &mut NamedTempFile, content: &[u8]) -> std::io::Result<()> {
    staging.write_all(content)?;
    staging.flush()?;
    staging.as_file().sync_all()
}
