use log::{debug, info, warn};

use crate::error::{ChainError, ConfigError, EndpointError};
use crate::release::{ReleaseInfo, UpdateFound};
use crate::traits::Endpoint;
use crate::version::{CurrentVersion, SchemeVersion};

/// Result of evaluating a single endpoint against the current version.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointOutcome {
    UpdateFound {
        version: SchemeVersion,
        release: ReleaseInfo,
    },
    NoUpdate {
        latest: SchemeVersion,
    },
}

/// Terminal, non-error outcome of a chain run.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    UpdateFound(UpdateFound),
    NoUpdate {
        endpoint: String,
        latest: SchemeVersion,
    },
}

/// Fetch one release and compare it with `current` under the current scheme.
///
/// # Errors
/// Returns the endpoint's network/parse error, or
/// [`EndpointError::MalformedVersion`] when the release tag cannot be read
/// under the active scheme.
pub async fn check_endpoint(
    endpoint: &dyn Endpoint,
    current: &CurrentVersion,
) -> Result<EndpointOutcome, EndpointError> {
    let release = endpoint.fetch_release().await?;
    let version = SchemeVersion::parse(current.scheme(), &release.version_tag)?;

    if version.is_newer_than(current)? {
        Ok(EndpointOutcome::UpdateFound { version, release })
    } else {
        Ok(EndpointOutcome::NoUpdate { latest: version })
    }
}

/// Ordered release sources. A failure advances to the next endpoint; no
/// endpoint is ever retried within a run.
pub struct EndpointChain {
    endpoints: Vec<Box<dyn Endpoint>>,
}

impl std::fmt::Debug for EndpointChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointChain")
            .field("endpoints", &self.names())
            .finish()
    }
}

impl EndpointChain {
    /// Build a chain from endpoints in fallback order.
    ///
    /// # Errors
    /// Returns [`ConfigError::EmptyChain`] when no endpoint is given.
    pub fn build(endpoints: Vec<Box<dyn Endpoint>>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyChain);
        }
        Ok(Self { endpoints })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.endpoints.iter().map(|endpoint| endpoint.name()).collect()
    }

    /// Walk the endpoints in order until one of them yields an answer.
    ///
    /// # Errors
    /// Returns [`ChainError::AllEndpointsFailed`] carrying the last endpoint's
    /// error once every endpoint has failed.
    pub async fn run(&self, current: &CurrentVersion) -> Result<ChainOutcome, ChainError> {
        let mut last_failure: Option<(String, EndpointError)> = None;

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let name = endpoint.name();
            debug!("Checking endpoint {name} ({}/{})", index + 1, self.len());

            match check_endpoint(endpoint.as_ref(), current).await {
                Ok(EndpointOutcome::UpdateFound { version, release }) => {
                    info!("Update found via {name}: {current} -> {version}");
                    return Ok(ChainOutcome::UpdateFound(UpdateFound {
                        endpoint: name.to_string(),
                        current_version: current.clone(),
                        new_version: version,
                        release,
                    }));
                }
                Ok(EndpointOutcome::NoUpdate { latest }) => {
                    info!("No update via {name}: latest is {latest}, current is {current}");
                    return Ok(ChainOutcome::NoUpdate {
                        endpoint: name.to_string(),
                        latest,
                    });
                }
                Err(error) => {
                    warn!("Endpoint {name} failed: {error}");
                    last_failure = Some((name.to_string(), error));
                }
            }
        }

        let (endpoint, last) = last_failure.unwrap_or_else(|| {
            (
                String::new(),
                EndpointError::no_release("no endpoints configured"),
            )
        });
        Err(ChainError::AllEndpointsFailed {
            attempted: self.len(),
            endpoint,
            last,
        })
    }
}
