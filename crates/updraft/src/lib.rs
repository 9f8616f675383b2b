//! Checks release hosts for a newer build of an application and fetches it.
//!
//! An [`UpdateCoordinator`] walks an ordered chain of provider endpoints
//! (GitHub, GitLab, Gitea or a self-hosted JSON document), compares the first
//! answer with the running version and hands any newer release to an
//! [`UpdateHandler`]. The [`Downloader`] then retrieves the artifact.

pub mod coordinator;
pub mod logging;
pub mod settings;

pub use coordinator::{
    CoordinatorError, DEFAULT_CHECK_INTERVAL, RunOutcome, SkipReason, UpdateCoordinator,
    UpdateCoordinatorBuilder, UpdateHandler, UpdateOffer,
};
pub use settings::{AuthSettings, EndpointSettings, SettingsError, UpdaterSettings};

pub use updraft_core as core;
pub use updraft_download::{
    CleanupReport, DownloadError, DownloadProgress, DownloadReport, Downloader, RetryPolicy,
    cleanup_previous_downloads, file_name_from_url, unique_download_path,
};
pub use updraft_platform::{
    AlwaysConnected, AppPaths, AppPathsError, JsonFileStore, MemoryStore, StateError, StateStore,
    TcpReachability, UpdaterState,
};
pub use updraft_providers as providers;
