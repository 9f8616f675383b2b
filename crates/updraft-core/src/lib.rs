//! Provider-independent pieces of the updater.
//!
//! - Version schemes and the comparator.
//! - The normalized release record and asset selection rules.
//! - Auth strategies for provider requests.
//! - The `Endpoint` seam and the fallback chain that drives it.

mod auth;
mod chain;
mod error;
mod release;
mod traits;
mod version;

pub use auth::{
    AuthStrategy, NoAuth, OAuth2Auth, PrivateTokenAuth, SharedAuth, TokenAuth, no_auth,
};
pub use chain::{ChainOutcome, EndpointChain, EndpointOutcome, check_endpoint};
pub use error::{ChainError, ConfigError, EndpointError};
pub use release::{
    ANDROID_PACKAGE_CONTENT_TYPE, AssetSelector, AssetTieBreak, AuthHeader, ReleaseInfo,
    UpdateFound,
};
pub use traits::{Connectivity, Endpoint};
pub use version::{CurrentVersion, SchemeVersion, VersionParseError, VersionScheme, is_newer};
