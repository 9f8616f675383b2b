use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use updraft_core::{
    AssetSelector, AssetTieBreak, AuthHeader, Endpoint, EndpointError, OAuth2Auth, ReleaseInfo,
    SharedAuth, TokenAuth, no_auth,
};

use crate::http::{self, DEFAULT_USER_AGENT};

pub const GITEA_API: &str = "https://gitea.com";
const OPERATION: &str = "gitea release fetch";

#[derive(Debug, Clone, Deserialize)]
struct GiteaAsset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GiteaRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    prerelease: bool,
    draft: bool,
    #[serde(default)]
    assets: Vec<GiteaAsset>,
}

/// Asset and channel rules applied to a Gitea release list.
#[derive(Debug, Clone, Default)]
pub struct GiteaSelection {
    pub prerelease: bool,
    pub assets: AssetSelector,
    pub tie_break: AssetTieBreak,
    /// Used as `html_url` when the release does not report one.
    pub fallback_html_url: Option<String>,
}

/// Parse a Gitea release list: the first published entry on the wanted
/// channel wins.
///
/// # Errors
/// Returns [`EndpointError::NoQualifyingRelease`] when no entry matches the
/// channel, [`EndpointError::MissingAsset`] when the chosen release has no
/// asset with the selected extension, and [`EndpointError::MalformedPayload`]
/// for unexpected JSON.
pub fn parse_release_list(
    body: &str,
    selection: &GiteaSelection,
    auth_header: Option<AuthHeader>,
) -> Result<ReleaseInfo, EndpointError> {
    let entries: Vec<Value> =
        serde_json::from_str(body).map_err(|error| EndpointError::malformed_from(OPERATION, error))?;

    for entry in entries {
        let release: GiteaRelease = serde_json::from_value(entry)
            .map_err(|error| EndpointError::malformed_from(OPERATION, error))?;
        if release.draft || release.prerelease != selection.prerelease {
            continue;
        }

        let matching = release
            .assets
            .iter()
            .filter(|asset| selection.assets.matches_name(&asset.name));
        let Some(asset) = selection.tie_break.pick(matching) else {
            return Err(EndpointError::missing_asset(release.tag_name));
        };

        return Ok(ReleaseInfo {
            download_url: asset.browser_download_url.clone(),
            version_tag: release.tag_name,
            is_prerelease: release.prerelease,
            is_draft: false,
            body: release.body,
            html_url: release
                .html_url
                .or_else(|| selection.fallback_html_url.clone()),
            auth_header,
        });
    }

    let channel = if selection.prerelease {
        "prerelease"
    } else {
        "stable release"
    };
    Err(EndpointError::no_release(format!(
        "no published {channel} in the Gitea release list"
    )))
}

/// Releases of a repository on a Gitea or Forgejo instance.
#[derive(Debug, Clone)]
pub struct GiteaEndpoint {
    name: String,
    client: reqwest::Client,
    repo: String,
    api_base: String,
    selection: GiteaSelection,
    auth: SharedAuth,
    user_agent: String,
}

impl GiteaEndpoint {
    pub fn new(client: reqwest::Client, repo: impl Into<String>) -> Self {
        let repo = repo.into();
        let mut endpoint = Self {
            name: format!("gitea:{repo}"),
            client,
            repo,
            api_base: GITEA_API.to_string(),
            selection: GiteaSelection::default(),
            auth: no_auth(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        };
        endpoint.refresh_fallback_url();
        endpoint
    }

    #[must_use]
    pub fn with_prerelease(mut self, prerelease: bool) -> Self {
        self.selection.prerelease = prerelease;
        self
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = http::trim_base(api_base);
        self.refresh_fallback_url();
        self
    }

    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.with_auth(Arc::new(TokenAuth::new(token)))
    }

    #[must_use]
    pub fn with_oauth2(self, token: impl Into<String>) -> Self {
        self.with_auth(Arc::new(OAuth2Auth::new(token)))
    }

    #[must_use]
    pub fn with_auth(mut self, auth: SharedAuth) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_assets(mut self, assets: AssetSelector) -> Self {
        self.selection.assets = assets;
        self
    }

    #[must_use]
    pub fn with_tie_break(mut self, tie_break: AssetTieBreak) -> Self {
        self.selection.tie_break = tie_break;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn refresh_fallback_url(&mut self) {
        self.selection.fallback_html_url = Some(format!("{}/{}/releases", self.api_base, self.repo));
    }

    fn url(&self) -> String {
        format!("{}/api/v1/repos/{}/releases", self.api_base, self.repo)
    }
}

#[async_trait]
impl Endpoint for GiteaEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_release(&self) -> Result<ReleaseInfo, EndpointError> {
        let url = self.url();
        debug!("Fetching Gitea releases from {url}");

        let request = self
            .client
            .get(&url)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", "application/json");
        let body = http::fetch_text(http::with_headers(request, &self.auth.headers()), OPERATION)
            .await?;

        parse_release_list(&body, &self.selection, self.auth.download_header())
    }
}
