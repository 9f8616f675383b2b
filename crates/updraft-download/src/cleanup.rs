use std::path::PathBuf;

use log::{debug, info};
use updraft_platform::{StateError, StateStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Entries that could not be deleted; retried on the next launch.
    pub kept: Vec<PathBuf>,
}

/// Delete artifacts recorded by earlier downloads.
///
/// Files that are already gone are forgotten. Files that cannot be deleted stay
/// recorded so a later launch can try again.
///
/// # Errors
/// Returns an error only when the state store itself cannot be updated.
pub fn cleanup_previous_downloads(store: &dyn StateStore) -> Result<CleanupReport, StateError> {
    let mut report = CleanupReport::default();

    store.update(&mut |state| {
        report = CleanupReport::default();
        state
            .previous_downloads
            .retain(|path| match std::fs::remove_file(path) {
                Ok(()) => {
                    report.removed.push(path.clone());
                    false
                }
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => false,
                Err(error) => {
                    debug!("Keeping {} for a later cleanup: {error}", path.display());
                    report.kept.push(path.clone());
                    true
                }
            });
    })?;

    if !report.removed.is_empty() {
        info!("Removed {} previously downloaded file(s)", report.removed.len());
    }
    Ok(report)
}
