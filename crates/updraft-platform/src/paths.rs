use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

/// Per-user directories of one application using the updater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub download_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the directories for `app_name` on the current platform.
    ///
    /// Downloads go to `{cache}/{app_name}/downloads`, falling back to the
    /// data directory when the platform has no cache directory.
    ///
    /// # Errors
    /// Returns an error when a required base directory cannot be determined.
    pub fn new(app_name: &str) -> Result<Self, AppPathsError> {
        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            let support = home.join("Library/Application Support").join(app_name);
            Ok(Self {
                config_dir: support.clone(),
                data_dir: support,
                download_dir: home.join("Library/Caches").join(app_name).join("downloads"),
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            let data_dir = dirs::data_dir()
                .ok_or(AppPathsError::DataDirUnavailable)?
                .join(app_name);
            let download_dir = dirs::cache_dir()
                .map_or_else(|| data_dir.clone(), |cache| cache.join(app_name))
                .join("downloads");
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(app_name),
                data_dir,
                download_dir,
            })
        }
    }

    /// Paths rooted under a single directory, for portable installs and tests.
    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            download_dir: root.join("downloads"),
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.download_dir)?;
        Ok(())
    }
}
