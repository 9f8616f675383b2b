//! Artifact retrieval: retried streaming downloads, collision-free file
//! naming and cleanup of artifacts left by earlier runs.

mod cleanup;
mod downloader;
mod error;
mod naming;

pub use cleanup::{CleanupReport, cleanup_previous_downloads};
pub use downloader::{DownloadProgress, DownloadReport, DownloadState, Downloader, RetryPolicy};
pub use error::DownloadError;
pub use naming::{file_name_from_url, unique_download_path};
