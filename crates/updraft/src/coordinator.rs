use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;
use updraft_core::{
    AuthHeader, ChainError, ChainOutcome, ConfigError, Connectivity, CurrentVersion, Endpoint,
    EndpointChain, SchemeVersion, UpdateFound, VersionScheme,
};
use updraft_download::cleanup_previous_downloads;
use updraft_platform::{StateError, StateStore, TcpReachability};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// What the host application is asked to confirm.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOffer {
    pub endpoint: String,
    pub current_version: CurrentVersion,
    pub new_version: SchemeVersion,
    pub download_url: String,
    pub release_notes: Option<String>,
    pub learn_more_url: Option<String>,
    /// Replay on the download request for private repositories.
    pub auth_header: Option<AuthHeader>,
}

impl From<UpdateFound> for UpdateOffer {
    fn from(found: UpdateFound) -> Self {
        Self {
            endpoint: found.endpoint,
            current_version: found.current_version,
            new_version: found.new_version,
            download_url: found.release.download_url,
            release_notes: found.release.body,
            learn_more_url: found.release.html_url,
            auth_header: found.release.auth_header,
        }
    }
}

/// Receives the offer when a newer build is found.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn on_update(&self, offer: &UpdateOffer);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    IntervalNotElapsed { next_check: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    UpToDate {
        endpoint: String,
        latest: SchemeVersion,
    },
    UpdateOffered(UpdateOffer),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("Failed to access updater state: {0}")]
    State(#[from] StateError),
}

/// Drives one update check: cleanup, connectivity and interval gating, the
/// endpoint chain, then the handler.
pub struct UpdateCoordinator {
    chain: EndpointChain,
    current: CurrentVersion,
    interval: chrono::Duration,
    connectivity: Arc<dyn Connectivity>,
    store: Arc<dyn StateStore>,
    handler: Arc<dyn UpdateHandler>,
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("chain", &self.chain)
            .field("current", &self.current)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl UpdateCoordinator {
    #[must_use]
    pub fn builder() -> UpdateCoordinatorBuilder {
        UpdateCoordinatorBuilder::default()
    }

    #[must_use]
    pub fn current_version(&self) -> &CurrentVersion {
        &self.current
    }

    #[must_use]
    pub fn chain(&self) -> &EndpointChain {
        &self.chain
    }

    /// Run a scheduled check, honouring the minimum interval.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::State`] when the interval bookkeeping cannot
    /// be persisted and [`CoordinatorError::Chain`] when every endpoint failed.
    pub async fn run(&self) -> Result<RunOutcome, CoordinatorError> {
        self.run_inner(false).await
    }

    /// Run a check now, ignoring the minimum interval. The run is still
    /// recorded as the latest one.
    ///
    /// # Errors
    /// Same as [`UpdateCoordinator::run`].
    pub async fn force_run(&self) -> Result<RunOutcome, CoordinatorError> {
        self.run_inner(true).await
    }

    async fn run_inner(&self, force: bool) -> Result<RunOutcome, CoordinatorError> {
        if let Err(error) = cleanup_previous_downloads(self.store.as_ref()) {
            warn!("Skipping cleanup of previous downloads: {error}");
        }

        if !self.connectivity.is_connected().await {
            info!("Offline, skipping update check");
            return Ok(RunOutcome::Skipped(SkipReason::Offline));
        }

        if let Some(next_check) = self.claim_run(force)? {
            debug!("Next update check due at {next_check}");
            return Ok(RunOutcome::Skipped(SkipReason::IntervalNotElapsed {
                next_check,
            }));
        }

        match self.chain.run(&self.current).await? {
            ChainOutcome::UpdateFound(found) => {
                let offer = UpdateOffer::from(found);
                self.handler.on_update(&offer).await;
                Ok(RunOutcome::UpdateOffered(offer))
            }
            ChainOutcome::NoUpdate { endpoint, latest } => {
                Ok(RunOutcome::UpToDate { endpoint, latest })
            }
        }
    }

    /// Record this run in the state store, unless the interval has not yet
    /// elapsed. Returns the next due time when the run must be skipped.
    fn claim_run(&self, force: bool) -> Result<Option<DateTime<Utc>>, StateError> {
        let now = Utc::now();
        let mut blocked_until = None;

        self.store.update(&mut |state| {
            blocked_until = None;
            if !force && let Some(last_run) = state.last_run.filter(|last_run| *last_run <= now) {
                // An interval past the calendar's end means the check is never due.
                let next_check = last_run
                    .checked_add_signed(self.interval)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if next_check > now {
                    blocked_until = Some(next_check);
                    return;
                }
            }
            state.last_run = Some(now);
        })?;

        Ok(blocked_until)
    }
}

#[derive(Default)]
pub struct UpdateCoordinatorBuilder {
    scheme: Option<VersionScheme>,
    current_raw: Option<String>,
    current: Option<CurrentVersion>,
    endpoints: Vec<Box<dyn Endpoint>>,
    chain: Option<EndpointChain>,
    interval: Option<Duration>,
    connectivity: Option<Arc<dyn Connectivity>>,
    store: Option<Arc<dyn StateStore>>,
    handler: Option<Arc<dyn UpdateHandler>>,
}

impl UpdateCoordinatorBuilder {
    #[must_use]
    pub fn scheme(mut self, scheme: VersionScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// The running build's version, parsed under the configured scheme.
    #[must_use]
    pub fn current_version(mut self, raw: impl Into<String>) -> Self {
        self.current_raw = Some(raw.into());
        self
    }

    #[must_use]
    pub fn parsed_current_version(mut self, current: CurrentVersion) -> Self {
        self.current = Some(current);
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<Box<dyn Endpoint>>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    #[must_use]
    pub fn chain(mut self, chain: EndpointChain) -> Self {
        self.chain = Some(chain);
        self
    }

    #[must_use]
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    #[must_use]
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn UpdateHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Validate the configuration and assemble the coordinator.
    ///
    /// # Errors
    /// - [`ConfigError::Missing`] when the version, state store or handler is absent.
    /// - [`ConfigError::SchemeMismatch`] when the current version does not fit
    ///   the configured scheme.
    /// - [`ConfigError::InvalidCurrentVersion`] for a non-finite decimal version.
    /// - [`ConfigError::EmptyChain`] when no endpoint was added.
    pub fn build(self) -> Result<UpdateCoordinator, ConfigError> {
        let current = resolve_current(self.scheme, self.current_raw, self.current)?;

        let chain = match self.chain {
            Some(chain) if self.endpoints.is_empty() => chain,
            Some(_) => {
                return Err(ConfigError::invalid(
                    "endpoints",
                    "use either a prebuilt chain or individual endpoints",
                ));
            }
            None => EndpointChain::build(self.endpoints)?,
        };

        let interval = self.interval.unwrap_or(DEFAULT_CHECK_INTERVAL);
        let interval = chrono::Duration::from_std(interval)
            .map_err(|error| ConfigError::invalid("check_interval", error.to_string()))?;

        Ok(UpdateCoordinator {
            chain,
            current,
            interval,
            connectivity: self
                .connectivity
                .unwrap_or_else(|| Arc::new(TcpReachability::default())),
            store: self.store.ok_or(ConfigError::Missing("state store"))?,
            handler: self.handler.ok_or(ConfigError::Missing("update handler"))?,
        })
    }
}

fn resolve_current(
    scheme: Option<VersionScheme>,
    raw: Option<String>,
    parsed: Option<CurrentVersion>,
) -> Result<CurrentVersion, ConfigError> {
    match (parsed, raw) {
        (Some(_), Some(_)) => Err(ConfigError::invalid(
            "current_version",
            "set either a raw or a parsed current version",
        )),
        (Some(current), None) => {
            if let Some(expected) = scheme
                && expected != current.scheme()
            {
                return Err(ConfigError::SchemeMismatch {
                    expected,
                    version: current.to_string(),
                });
            }
            if let SchemeVersion::DecimalIncremental(value) = current
                && !value.is_finite()
            {
                return Err(ConfigError::InvalidCurrentVersion(
                    updraft_core::VersionParseError::Decimal {
                        input: value.to_string(),
                    },
                ));
            }
            Ok(current)
        }
        (None, Some(raw)) => {
            let expected = scheme.unwrap_or_default();
            SchemeVersion::parse(expected, &raw).map_err(|_| ConfigError::SchemeMismatch {
                expected,
                version: raw,
            })
        }
        (None, None) => Err(ConfigError::Missing("current version")),
    }
}
