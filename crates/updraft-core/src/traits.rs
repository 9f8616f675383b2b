use async_trait::async_trait;

use crate::error::EndpointError;
use crate::release::ReleaseInfo;

/// One release source. An invocation issues exactly one network request.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Identifier used in logs and outcomes, for example `github:owner/repo`.
    fn name(&self) -> &str;

    async fn fetch_release(&self) -> Result<ReleaseInfo, EndpointError>;
}

impl<T: Endpoint + 'static> From<T> for Box<dyn Endpoint> {
    fn from(endpoint: T) -> Self {
        Box::new(endpoint)
    }
}

/// Reports whether the host currently has network access.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_connected(&self) -> bool;
}
