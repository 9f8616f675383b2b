use std::io::Write;
use std::path::Path;

/// Write `data` to a temp file beside `path`, sync it, then move it over
/// `path`. A crash leaves either the old contents or the new ones.
///
/// # Errors
/// Returns an error when the directory does not exist or the temp file cannot
/// be written or moved into place.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = tempfile::Builder::new()
        .prefix(".updraft-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|error| error.error)?;
    Ok(())
}
