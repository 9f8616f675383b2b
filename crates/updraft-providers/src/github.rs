use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use updraft_core::{
    AssetSelector, AuthHeader, Endpoint, EndpointError, ReleaseInfo, SharedAuth, TokenAuth,
    no_auth,
};

use crate::http::{self, DEFAULT_USER_AGENT};

pub const GITHUB_API: &str = "https://api.github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3.full+json";
const OPERATION: &str = "github release fetch";

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub prerelease: bool,
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    fn into_release_info(
        self,
        assets: &AssetSelector,
        auth_header: Option<AuthHeader>,
    ) -> Result<ReleaseInfo, EndpointError> {
        let Some(asset) = self
            .assets
            .iter()
            .find(|asset| assets.matches_content_type(&asset.content_type))
        else {
            return Err(EndpointError::missing_asset(self.tag_name));
        };

        Ok(ReleaseInfo {
            download_url: asset.browser_download_url.clone(),
            version_tag: self.tag_name,
            is_prerelease: self.prerelease,
            is_draft: self.draft,
            body: self.body,
            html_url: self.html_url,
            auth_header,
        })
    }
}

/// Parse the single object returned by `/releases/latest`.
///
/// # Errors
/// Returns [`EndpointError::MalformedPayload`] for unexpected JSON and
/// [`EndpointError::MissingAsset`] when no asset has the selected content type.
pub fn parse_latest(
    body: &str,
    assets: &AssetSelector,
    auth_header: Option<AuthHeader>,
) -> Result<ReleaseInfo, EndpointError> {
    let release: GitHubRelease =
        serde_json::from_str(body).map_err(|error| EndpointError::malformed_from(OPERATION, error))?;
    release.into_release_info(assets, auth_header)
}

/// Parse the `/releases` list and take the newest published prerelease.
///
/// Stable releases are never used as a fallback here.
///
/// # Errors
/// Returns [`EndpointError::NoQualifyingRelease`] when the list holds no
/// published prerelease, plus the errors of [`parse_latest`].
pub fn parse_release_list(
    body: &str,
    assets: &AssetSelector,
    auth_header: Option<AuthHeader>,
) -> Result<ReleaseInfo, EndpointError> {
    let entries: Vec<Value> =
        serde_json::from_str(body).map_err(|error| EndpointError::malformed_from(OPERATION, error))?;

    for entry in entries {
        let release: GitHubRelease = serde_json::from_value(entry)
            .map_err(|error| EndpointError::malformed_from(OPERATION, error))?;
        if !release.draft && release.prerelease {
            return release.into_release_info(assets, auth_header);
        }
    }

    Err(EndpointError::no_release(
        "no published prerelease in the GitHub release list",
    ))
}

/// Releases of a GitHub repository, `owner/repo`.
#[derive(Debug, Clone)]
pub struct GitHubEndpoint {
    name: String,
    client: reqwest::Client,
    repo: String,
    api_base: String,
    prerelease: bool,
    auth: SharedAuth,
    assets: AssetSelector,
    user_agent: String,
}

impl GitHubEndpoint {
    pub fn new(client: reqwest::Client, repo: impl Into<String>) -> Self {
        let repo = repo.into();
        Self {
            name: format!("github:{repo}"),
            client,
            repo,
            api_base: GITHUB_API.to_string(),
            prerelease: false,
            auth: no_auth(),
            assets: AssetSelector::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn with_prerelease(mut self, prerelease: bool) -> Self {
        self.prerelease = prerelease;
        self
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = http::trim_base(api_base);
        self
    }

    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.with_auth(std::sync::Arc::new(TokenAuth::new(token)))
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
        if self.prerelease {
            format!("{}/repos/{}/releases", self.api_base, self.repo)
        } else {
            format!("{}/repos/{}/releases/latest", self.api_base, self.repo)
        }
    }
}

#[async_trait]
impl Endpoint for GitHubEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_release(&self) -> Result<ReleaseInfo, EndpointError> {
        let url = self.url();
        debug!("Fetching GitHub release from {url}");

        let request = self
            .client
            .get(&url)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", GITHUB_ACCEPT);
        let body = http::fetch_text(http::with_headers(request, &self.auth.headers()), OPERATION)
            .await?;

        let download_header = self.auth.download_header();
        if self.prerelease {
            parse_release_list(&body, &self.assets, download_header)
        } else {
            parse_latest(&body, &self.assets, download_header)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release_json(tag: &str, prerelease: bool, draft: bool) -> String {
        format!(
            r#"{{
                "tag_name": "{tag}",
                "html_url": "https://github.com/acme/app/releases/tag/{tag}",
                "body": "notes for {tag}",
                "prerelease": {prerelease},
                "draft": {draft},
                "assets": [
                    {{
                        "name": "app-{tag}.apk.sha256",
                        "content_type": "text/plain",
                        "browser_download_url": "https://dl.example.com/{tag}.sha256"
                    }},
                    {{
                        "name": "app-{tag}.apk",
                        "content_type": "application/vnd.android.package-archive",
                        "browser_download_url": "https://dl.example.com/{tag}.apk"
                    }}
                ]
            }}"#
        )
    }

    #[test]
    fn parse_latest_selects_asset_by_content_type() {
        let release = parse_latest(
            &release_json("v1.4.0", false, false),
            &AssetSelector::default(),
            None,
        )
        .expect("latest release should parse");

        assert_eq!(release.version_tag, "v1.4.0");
        assert_eq!(release.download_url, "https://dl.example.com/v1.4.0.apk");
        assert_eq!(release.body.as_deref(), Some("notes for v1.4.0"));
        assert_eq!(
            release.html_url.as_deref(),
            Some("https://github.com/acme/app/releases/tag/v1.4.0")
        );
        assert!(release.auth_header.is_none());
    }

    #[test]
    fn parse_latest_reports_missing_asset() {
        let body = r#"{ "tag_name": "v2.0.0", "prerelease": false, "draft": false, "assets": [] }"#;

        let error = parse_latest(body, &AssetSelector::default(), None)
            .expect_err("release without assets");

        assert_eq!(error, EndpointError::missing_asset("v2.0.0"));
    }

    #[test]
    fn parse_latest_rejects_unexpected_shape() {
        let error = parse_latest("[]", &AssetSelector::default(), None)
            .expect_err("array is not a release object");

        assert!(matches!(error, EndpointError::MalformedPayload { .. }));
    }

    #[test]
    fn release_list_skips_drafts_and_stable_releases() {
        let body = format!(
            "[{}, {}, {}, {}]",
            release_json("v3.0.0", false, true),
            release_json("v2.0.0-rc.2", true, true),
            release_json("v2.0.0-rc.1", true, false),
            release_json("v1.9.0", false, false),
        );

        let release = parse_release_list(&body, &AssetSelector::default(), None)
            .expect("published prerelease should be found");

        assert_eq!(release.version_tag, "v2.0.0-rc.1");
        assert!(release.is_prerelease);
        assert!(!release.is_draft);
    }

    #[test]
    fn release_list_without_prerelease_does_not_fall_back_to_stable() {
        let body = format!(
            "[{}, {}]",
            release_json("v1.9.0", false, false),
            release_json("v2.0.0-rc.1", true, true),
        );

        let error = parse_release_list(&body, &AssetSelector::default(), None)
            .expect_err("only drafts and stable releases");

        assert!(matches!(error, EndpointError::NoQualifyingRelease { .. }));
    }

    #[test]
    fn token_is_forwarded_as_download_header() {
        let header = AuthHeader::new("Authorization", "token secret");

        let release = parse_latest(
            &release_json("v1.0.0", false, false),
            &AssetSelector::default(),
            Some(header.clone()),
        )
        .expect("latest release should parse");

        assert_eq!(release.auth_header, Some(header));
    }

    #[test]
    fn url_depends_on_prerelease_flag() {
        let endpoint = GitHubEndpoint::new(reqwest::Client::new(), "acme/app")
            .with_api_base("https://ghe.example.com/api/v3/");

        assert_eq!(
            endpoint.url(),
            "https://ghe.example.com/api/v3/repos/acme/app/releases/latest"
        );
        assert_eq!(
            endpoint.with_prerelease(true).url(),
            "https://ghe.example.com/api/v3/repos/acme/app/releases"
        );
    }
}
