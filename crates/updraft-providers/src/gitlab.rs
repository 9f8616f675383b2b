use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use updraft_core::{
    AssetSelector, AuthHeader, Endpoint, EndpointError, OAuth2Auth, PrivateTokenAuth,
    ReleaseInfo, SharedAuth, no_auth,
};

use crate::http::{self, DEFAULT_USER_AGENT};

pub const GITLAB_API: &str = "https://gitlab.com";
const OPERATION: &str = "gitlab release fetch";

#[derive(Debug, Clone, Deserialize)]
struct GitLabRelease {
    tag_name: String,
    #[serde(default)]
    description: Option<String>,
    assets: GitLabAssets,
    #[serde(default, rename = "_links")]
    links: Option<GitLabReleaseLinks>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitLabAssets {
    #[serde(default)]
    links: Vec<GitLabAssetLink>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitLabAssetLink {
    name: String,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GitLabReleaseLinks {
    #[serde(default, rename = "self")]
    self_url: Option<String>,
}

/// Parse a project release list. Only the newest entry is considered.
///
/// # Errors
/// Returns [`EndpointError::NoQualifyingRelease`] for an empty list,
/// [`EndpointError::MissingAsset`] when the newest release links no asset with
/// the selected extension, and [`EndpointError::MalformedPayload`] otherwise.
pub fn parse_release_list(
    body: &str,
    assets: &AssetSelector,
    auth_header: Option<AuthHeader>,
) -> Result<ReleaseInfo, EndpointError> {
    let entries: Vec<Value> =
        serde_json::from_str(body).map_err(|error| EndpointError::malformed_from(OPERATION, error))?;
    let Some(newest) = entries.into_iter().next() else {
        return Err(EndpointError::no_release("GitLab project has no releases"));
    };

    let release: GitLabRelease = serde_json::from_value(newest)
        .map_err(|error| EndpointError::malformed_from(OPERATION, error))?;
    let Some(link) = release
        .assets
        .links
        .into_iter()
        .find(|link| assets.matches_name(&link.name))
    else {
        return Err(EndpointError::missing_asset(release.tag_name));
    };

    let mut info = ReleaseInfo::new(release.tag_name, link.url);
    info.body = release.description;
    info.html_url = release.links.and_then(|links| links.self_url);
    info.auth_header = auth_header;
    Ok(info)
}

/// Releases of a GitLab project addressed by its numeric id.
///
/// GitLab has no prerelease flag on releases, so the newest entry always wins.
#[derive(Debug, Clone)]
pub struct GitLabEndpoint {
    name: String,
    client: reqwest::Client,
    project_id: u64,
    api_base: String,
    auth: SharedAuth,
    assets: AssetSelector,
    user_agent: String,
}

impl GitLabEndpoint {
    pub fn new(client: reqwest::Client, project_id: u64) -> Self {
        Self {
            name: format!("gitlab:{project_id}"),
            client,
            project_id,
            api_base: GITLAB_API.to_string(),
            auth: no_auth(),
            assets: AssetSelector::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = http::trim_base(api_base);
        self
    }

    #[must_use]
    pub fn with_private_token(self, token: impl Into<String>) -> Self {
        self.with_auth(Arc::new(PrivateTokenAuth::new(token)))
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
        self.assets = assets;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/api/v4/projects/{}/releases",
            self.api_base, self.project_id
        )
    }
}

#[async_trait]
impl Endpoint for GitLabEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_release(&self) -> Result<ReleaseInfo, EndpointError> {
        let url = self.url();
        debug!("Fetching GitLab releases from {url}");

        let request = self
            .client
            .get(&url)
            .header("User-Agent", self.user_agent.as_str());
        let body = http::fetch_text(http::with_headers(request, &self.auth.headers()), OPERATION)
            .await?;

        parse_release_list(&body, &self.assets, self.auth.download_header())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASES: &str = r#"[
        {
            "tag_name": "v5.1.0",
            "description": "Bug fixes",
            "assets": {
                "count": 3,
                "sources": [{ "format": "zip", "url": "https://gitlab.com/acme/app/-/archive/v5.1.0.zip" }],
                "links": [
                    { "id": 1, "name": "checksums.txt", "url": "https://gitlab.com/dl/checksums.txt" },
                    { "id": 2, "name": "app-release.apk", "url": "https://gitlab.com/dl/app-release.apk" }
                ]
            },
            "_links": { "self": "https://gitlab.com/acme/app/-/releases/v5.1.0" }
        },
        {
            "tag_name": "v5.0.0",
            "assets": { "links": [{ "name": "old.apk", "url": "https://gitlab.com/dl/old.apk" }] }
        }
    ]"#;

    #[test]
    fn newest_release_and_apk_link_are_used() {
        let release = parse_release_list(RELEASES, &AssetSelector::default(), None)
            .expect("release list should parse");

        assert_eq!(release.version_tag, "v5.1.0");
        assert_eq!(release.download_url, "https://gitlab.com/dl/app-release.apk");
        assert_eq!(release.body.as_deref(), Some("Bug fixes"));
        assert_eq!(
            release.html_url.as_deref(),
            Some("https://gitlab.com/acme/app/-/releases/v5.1.0")
        );
    }

    #[test]
    fn empty_list_has_no_qualifying_release() {
        let error = parse_release_list("[]", &AssetSelector::default(), None)
            .expect_err("empty list");

        assert!(matches!(error, EndpointError::NoQualifyingRelease { .. }));
    }

    #[test]
    fn newest_release_without_apk_is_missing_asset() {
        let body = r#"[
            { "tag_name": "v6.0.0", "assets": { "links": [] } },
            { "tag_name": "v5.0.0", "assets": { "links": [{ "name": "a.apk", "url": "u" }] } }
        ]"#;

        let error = parse_release_list(body, &AssetSelector::default(), None)
            .expect_err("newest release has no package");

        assert_eq!(error, EndpointError::missing_asset("v6.0.0"));
    }

    #[test]
    fn endpoint_uses_projects_api() {
        let endpoint = GitLabEndpoint::new(reqwest::Client::new(), 4242)
            .with_api_base("https://git.example.com/");

        assert_eq!(
            endpoint.url(),
            "https://git.example.com/api/v4/projects/4242/releases"
        );
        assert_eq!(endpoint.name(), "gitlab:4242");
    }

    #[test]
    fn private_token_becomes_download_header() {
        let endpoint = GitLabEndpoint::new(reqwest::Client::new(), 1).with_private_token("glpat");

        assert_eq!(
            endpoint.auth.download_header(),
            Some(AuthHeader::new("Private-Token", "glpat"))
        );
    }
}
