//! Release endpoints for the hosting providers the updater understands.

pub mod gitea;
pub mod github;
pub mod gitlab;
mod http;
pub mod json;

pub use gitea::{GiteaEndpoint, GiteaSelection};
pub use github::GitHubEndpoint;
pub use gitlab::GitLabEndpoint;
pub use http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, build_client};
pub use json::{JsonEndpoint, JsonFields, JsonShape};
