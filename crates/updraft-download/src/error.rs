use std::path::{Path, PathBuf};

use thiserror::Error;
use updraft_platform::StateError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Download of {url} failed after {attempts} attempt(s): {details}")]
    Network {
        url: String,
        attempts: u32,
        status: Option<u16>,
        details: String,
    },
    #[error("Destination already exists: {}", path.display())]
    FileExists { path: PathBuf },
    #[error("{context} {}: {source}", path.display())]
    Disk {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to record download: {0}")]
    State(#[from] StateError),
}

impl DownloadError {
    pub(crate) fn disk(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Disk {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn file_exists(path: &Path) -> Self {
        Self::FileExists {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}
