use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use updraft_core::{
    AssetSelector, AssetTieBreak, ConfigError, CurrentVersion, Endpoint, EndpointChain, NoAuth,
    OAuth2Auth, PrivateTokenAuth, SchemeVersion, SharedAuth, TokenAuth, VersionScheme,
};
use updraft_download::RetryPolicy;
use updraft_providers::{
    GitHubEndpoint, GitLabEndpoint, GiteaEndpoint, JsonEndpoint, JsonFields, JsonShape,
    build_client,
};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Credentials attached to provider requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthSettings {
    #[default]
    None,
    Token {
        token: String,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        token: String,
    },
    PrivateToken {
        token: String,
    },
}

impl AuthSettings {
    fn strategy(&self) -> SharedAuth {
        match self {
            Self::None => Arc::new(NoAuth),
            Self::Token { token } => Arc::new(TokenAuth::new(token.clone())),
            Self::OAuth2 { token } => Arc::new(OAuth2Auth::new(token.clone())),
            Self::PrivateToken { token } => Arc::new(PrivateTokenAuth::new(token.clone())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Token { .. } => "token",
            Self::OAuth2 { .. } => "oauth2",
            Self::PrivateToken { .. } => "private_token",
        }
    }
}

/// One release source, in fallback order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EndpointSettings {
    #[serde(rename = "github")]
    GitHub {
        repo: String,
        #[serde(default)]
        prerelease: bool,
        #[serde(default)]
        api_base: Option<String>,
        #[serde(default)]
        auth: AuthSettings,
    },
    #[serde(rename = "gitlab")]
    GitLab {
        project_id: u64,
        #[serde(default)]
        api_base: Option<String>,
        #[serde(default)]
        auth: AuthSettings,
    },
    Gitea {
        repo: String,
        #[serde(default)]
        prerelease: bool,
        #[serde(default)]
        api_base: Option<String>,
        #[serde(default)]
        auth: AuthSettings,
        #[serde(default)]
        tie_break: AssetTieBreak,
    },
    Json {
        url: String,
        #[serde(default)]
        shape: JsonShape,
        #[serde(default)]
        fields: JsonFields,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl EndpointSettings {
    fn build(
        &self,
        client: &reqwest::Client,
        user_agent: &str,
        assets: &AssetSelector,
    ) -> Result<Box<dyn Endpoint>, ConfigError> {
        let endpoint: Box<dyn Endpoint> = match self {
            Self::GitHub {
                repo,
                prerelease,
                api_base,
                auth,
            } => {
                require_auth(auth, &["none", "token"], "github")?;
                let mut endpoint = GitHubEndpoint::new(client.clone(), non_empty("repo", repo)?)
                    .with_prerelease(*prerelease)
                    .with_auth(auth.strategy())
                    .with_assets(assets.clone())
                    .with_user_agent(user_agent);
                if let Some(api_base) = api_base {
                    endpoint = endpoint.with_api_base(api_base.clone());
                }
                endpoint.into()
            }
            Self::GitLab {
                project_id,
                api_base,
                auth,
            } => {
                require_auth(auth, &["none", "oauth2", "private_token"], "gitlab")?;
                let mut endpoint = GitLabEndpoint::new(client.clone(), *project_id)
                    .with_auth(auth.strategy())
                    .with_assets(assets.clone())
                    .with_user_agent(user_agent);
                if let Some(api_base) = api_base {
                    endpoint = endpoint.with_api_base(api_base.clone());
                }
                endpoint.into()
            }
            Self::Gitea {
                repo,
                prerelease,
                api_base,
                auth,
                tie_break,
            } => {
                require_auth(auth, &["none", "token", "oauth2"], "gitea")?;
                let mut endpoint = GiteaEndpoint::new(client.clone(), non_empty("repo", repo)?)
                    .with_prerelease(*prerelease)
                    .with_auth(auth.strategy())
                    .with_assets(assets.clone())
                    .with_tie_break(*tie_break)
                    .with_user_agent(user_agent);
                if let Some(api_base) = api_base {
                    endpoint = endpoint.with_api_base(api_base.clone());
                }
                endpoint.into()
            }
            Self::Json {
                url,
                shape,
                fields,
                method,
                headers,
            } => {
                let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|error| ConfigError::invalid("method", error.to_string()))?;
                let mut endpoint =
                    JsonEndpoint::new(client.clone(), non_empty("url", url)?, *shape)
                        .with_fields(fields.clone())
                        .with_method(method)
                        .with_user_agent(user_agent);
                for (name, value) in headers {
                    endpoint = endpoint.with_header(name.clone(), value.clone());
                }
                endpoint.into()
            }
        };
        Ok(endpoint)
    }
}

fn require_auth(
    auth: &AuthSettings,
    allowed: &[&str],
    provider: &'static str,
) -> Result<(), ConfigError> {
    if allowed.contains(&auth.kind()) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "auth",
            format!("{provider} does not support {} credentials", auth.kind()),
        ))
    }
}

fn non_empty<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::invalid(field, "must not be empty"))
    } else {
        Ok(value)
    }
}

/// Updater configuration stored at `{config_dir}/settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterSettings {
    #[serde(default)]
    pub scheme: VersionScheme,

    #[serde(default)]
    pub current_version: Option<String>,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,

    #[serde(default = "default_download_backoff")]
    pub download_backoff_secs: u64,

    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    #[serde(default)]
    pub skip_connectivity_check: bool,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default)]
    pub assets: AssetSelector,

    #[serde(default)]
    pub endpoints: Vec<EndpointSettings>,
}

fn default_check_interval() -> u64 {
    24 * 60 * 60
}

fn default_http_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    updraft_providers::DEFAULT_USER_AGENT.to_string()
}

fn default_download_attempts() -> u32 {
    3
}

fn default_download_backoff() -> u64 {
    2
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_method() -> String {
    "GET".to_string()
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            scheme: VersionScheme::default(),
            current_version: None,
            check_interval_secs: default_check_interval(),
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
            download_attempts: default_download_attempts(),
            download_backoff_secs: default_download_backoff(),
            download_dir: None,
            skip_connectivity_check: false,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            assets: AssetSelector::default(),
            endpoints: Vec::new(),
        }
    }
}

impl UpdaterSettings {
    /// Read settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(SettingsError::Io {
                context: "failed to read settings",
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// # Errors
    /// Returns an error when the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |context, source| SettingsError::Io {
            context,
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| io_error("failed to create settings directory", source))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        updraft_platform::write_atomic(path, content.as_bytes())
            .map_err(|source| io_error("failed to write settings", source))
    }

    /// # Errors
    /// Returns a [`ConfigError`] when no version is configured or it does not
    /// fit the configured scheme.
    pub fn current(&self) -> Result<CurrentVersion, ConfigError> {
        let raw = self
            .current_version
            .as_deref()
            .ok_or(ConfigError::Missing("current_version"))?;
        SchemeVersion::parse(self.scheme, raw).map_err(|_| ConfigError::SchemeMismatch {
            expected: self.scheme,
            version: raw.to_string(),
        })
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.download_attempts.max(1),
            backoff_step: Duration::from_secs(self.download_backoff_secs),
        }
    }

    /// # Errors
    /// Returns [`ConfigError::Invalid`] when the HTTP client cannot be built.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        build_client(
            &self.user_agent,
            Duration::from_secs(self.http_timeout_secs),
            Duration::from_secs(self.connect_timeout_secs),
        )
        .map_err(|error| ConfigError::invalid("http client", error.to_string()))
    }

    /// Build the endpoint chain in configuration order.
    ///
    /// # Errors
    /// Returns [`ConfigError::EmptyChain`] without endpoints and
    /// [`ConfigError::Invalid`] for an unusable endpoint entry.
    pub fn build_chain(&self, client: &reqwest::Client) -> Result<EndpointChain, ConfigError> {
        let endpoints = self
            .endpoints
            .iter()
            .map(|endpoint| endpoint.build(client, &self.user_agent, &self.assets))
            .collect::<Result<Vec<_>, _>>()?;
        EndpointChain::build(endpoints)
    }
}
