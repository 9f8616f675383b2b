use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use updraft_core::AuthHeader;
use updraft_platform::StateStore;

use crate::error::DownloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: nothing before the first attempt, then one more step
    /// per attempt.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadProgress {
    Attempt { attempt: u32, max_attempts: u32 },
    Downloading { downloaded: u64, total: u64 },
    Retrying { next_attempt: u32, delay: Duration, reason: String },
    Complete { path: PathBuf, bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub attempts: u32,
}

/// Bookkeeping for one download while it is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadState {
    pub url: String,
    pub destination: PathBuf,
    pub headers: Vec<AuthHeader>,
    pub attempts: u32,
}

impl DownloadState {
    #[must_use]
    pub fn new(url: &str, headers: &[AuthHeader], destination: &Path) -> Self {
        Self {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            headers: headers.to_vec(),
            attempts: 0,
        }
    }
}

enum AttemptError {
    Network { status: Option<u16>, details: String },
    Fatal(DownloadError),
}

impl AttemptError {
    fn network(details: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            details: details.into(),
        }
    }
}

pub struct Downloader {
    client: reqwest::Client,
    store: Arc<dyn StateStore>,
    retry: RetryPolicy,
    progress: Option<mpsc::Sender<DownloadProgress>>,
}

impl Downloader {
    pub fn new(client: reqwest::Client, store: Arc<dyn StateStore>) -> Self {
        Self {
            client,
            store,
            retry: RetryPolicy::default(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: mpsc::Sender<DownloadProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fetch `url` into `destination`, retrying network failures.
    ///
    /// The file only appears at `destination` once the whole body has been
    /// written; dropping the future before that leaves nothing behind.
    ///
    /// # Errors
    /// - [`DownloadError::FileExists`] when `destination` is already taken.
    /// - [`DownloadError::Network`] once every attempt has failed.
    /// - [`DownloadError::Disk`] on the first local I/O failure.
    /// - [`DownloadError::State`] when the finished download cannot be recorded;
    ///   the file is removed again so nothing untracked stays behind.
    pub async fn download(
        &self,
        url: &str,
        headers: &[AuthHeader],
        destination: &Path,
    ) -> Result<DownloadReport, DownloadError> {
        if tokio::fs::try_exists(destination).await.unwrap_or(false) {
            return Err(DownloadError::file_exists(destination));
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut state = DownloadState::new(url, headers, destination);

        loop {
            state.attempts += 1;
            let delay = self.retry.delay_before(state.attempts);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            debug!(
                "Downloading {url} (attempt {}/{max_attempts})",
                state.attempts
            );
            self.report(DownloadProgress::Attempt {
                attempt: state.attempts,
                max_attempts,
            })
            .await;

            match self.attempt(&state).await {
                Ok((staged, bytes)) => return self.commit(&state, staged, bytes).await,
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Network { status, details }) => {
                    if state.attempts >= max_attempts {
                        warn!("Giving up on {url} after {} attempt(s): {details}", state.attempts);
                        return Err(DownloadError::Network {
                            url: state.url,
                            attempts: state.attempts,
                            status,
                            details,
                        });
                    }

                    let next_attempt = state.attempts + 1;
                    warn!("Download attempt {} for {url} failed: {details}", state.attempts);
                    self.report(DownloadProgress::Retrying {
                        next_attempt,
                        delay: self.retry.delay_before(next_attempt),
                        reason: details,
                    })
                    .await;
                }
            }
        }
    }

    async fn attempt(&self, state: &DownloadState) -> Result<(TempPath, u64), AttemptError> {
        let mut request = self.client.get(&state.url);
        for header in &state.headers {
            request = request.header(header.name.as_str(), header.value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|error| AttemptError::network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Network {
                status: Some(status.as_u16()),
                details: format!("HTTP {status}"),
            });
        }

        let (file, staged) = stage_file(&state.destination).map_err(AttemptError::Fatal)?;
        let mut file = tokio::fs::File::from_std(file);

        let total = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| AttemptError::network(error.to_string()))?;
            file.write_all(&chunk).await.map_err(|error| {
                AttemptError::Fatal(DownloadError::disk(
                    "failed to write download data",
                    &staged,
                    error,
                ))
            })?;
            downloaded += chunk.len() as u64;
            self.report(DownloadProgress::Downloading { downloaded, total })
                .await;
        }

        file.flush().await.map_err(|error| {
            AttemptError::Fatal(DownloadError::disk(
                "failed to flush download file",
                &staged,
                error,
            ))
        })?;
        file.sync_all().await.map_err(|error| {
            AttemptError::Fatal(DownloadError::disk(
                "failed to sync download file",
                &staged,
                error,
            ))
        })?;

        Ok((staged, downloaded))
    }

    async fn commit(
        &self,
        state: &DownloadState,
        staged: TempPath,
        bytes: u64,
    ) -> Result<DownloadReport, DownloadError> {
        let destination = state.destination.clone();
        staged.persist_noclobber(&destination).map_err(|error| {
            if error.error.kind() == std::io::ErrorKind::AlreadyExists {
                DownloadError::file_exists(&destination)
            } else {
                DownloadError::disk("failed to move download into place", &destination, error.error)
            }
        })?;

        let recorded = self.store.update(&mut |updater_state| {
            updater_state
                .previous_downloads
                .insert(destination.clone());
        });
        if let Err(error) = recorded {
            // An unrecorded file would never be cleaned up.
            warn!(
                "Removing {}, it could not be recorded: {error}",
                destination.display()
            );
            if let Err(remove_error) = std::fs::remove_file(&destination) {
                warn!("Failed to remove {}: {remove_error}", destination.display());
            }
            return Err(error.into());
        }

        info!(
            "Downloaded {bytes} bytes to {} in {} attempt(s)",
            destination.display(),
            state.attempts
        );
        self.report(DownloadProgress::Complete {
            path: destination.clone(),
            bytes,
        })
        .await;

        Ok(DownloadReport {
            path: destination,
            bytes,
            attempts: state.attempts,
        })
    }

    async fn report(&self, progress: DownloadProgress) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(progress).await;
        }
    }
}

fn stage_file(destination: &Path) -> Result<(std::fs::File, TempPath), DownloadError> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(parent).map_err(|error| {
        DownloadError::disk("failed to create download directory", parent, error)
    })?;

    let staged = tempfile::Builder::new()
        .prefix(".updraft-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|error| DownloadError::disk("failed to create temp file", parent, error))?;
    Ok(staged.into_parts())
}
