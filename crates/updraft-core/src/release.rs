use serde::{Deserialize, Serialize};

use crate::version::{CurrentVersion, SchemeVersion};

/// A single HTTP header to replay on the download request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

impl AuthHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Normalized result of parsing one provider release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version_tag: String,
    pub download_url: String,
    pub is_prerelease: bool,
    pub is_draft: bool,
    pub body: Option<String>,
    pub html_url: Option<String>,
    pub auth_header: Option<AuthHeader>,
}

impl ReleaseInfo {
    pub fn new(version_tag: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            version_tag: version_tag.into(),
            download_url: download_url.into(),
            is_prerelease: false,
            is_draft: false,
            body: None,
            html_url: None,
            auth_header: None,
        }
    }
}

/// Which asset wins when a release carries several installable artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetTieBreak {
    #[default]
    First,
    Last,
}

impl AssetTieBreak {
    /// Pick one item out of the matches according to the tie-break.
    pub fn pick<I, T>(self, mut matches: I) -> Option<T>
    where
        I: Iterator<Item = T>,
    {
        match self {
            Self::First => matches.next(),
            Self::Last => matches.last(),
        }
    }
}

/// Describes the installable artifact inside a release.
///
/// GitHub reports a content type per asset; GitLab and Gitea only expose the
/// asset name, so those providers match on the file extension instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSelector {
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_extension")]
    pub extension: String,
}

pub const ANDROID_PACKAGE_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

fn default_content_type() -> String {
    ANDROID_PACKAGE_CONTENT_TYPE.to_string()
}

fn default_extension() -> String {
    ".apk".to_string()
}

impl Default for AssetSelector {
    fn default() -> Self {
        Self {
            content_type: default_content_type(),
            extension: default_extension(),
        }
    }
}

impl AssetSelector {
    #[must_use]
    pub fn matches_content_type(&self, content_type: &str) -> bool {
        content_type == self.content_type
    }

    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        name.ends_with(&self.extension)
    }
}

/// Outcome of a chain run that found something newer.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFound {
    pub endpoint: String,
    pub current_version: CurrentVersion,
    pub new_version: SchemeVersion,
    pub release: ReleaseInfo,
}
