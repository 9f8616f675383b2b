use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use updraft_core::{AuthHeader, Endpoint, EndpointError, ReleaseInfo};

use crate::http::{self, DEFAULT_USER_AGENT};

const OPERATION: &str = "json release fetch";

/// Top-level JSON node the endpoint answers with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonShape {
    #[default]
    Object,
    /// Only the first element is read.
    Array,
}

/// Attribute names to read from the release object.
///
/// A name starting with `/` is resolved as a JSON pointer, so nested values
/// such as `/android/version` can be addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFields {
    #[serde(default = "default_version_field")]
    pub version: String,
    #[serde(default = "default_download_field")]
    pub download_url: String,
    #[serde(default)]
    pub learn_more: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
}

fn default_version_field() -> String {
    "version".to_string()
}

fn default_download_field() -> String {
    "download".to_string()
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            version: default_version_field(),
            download_url: default_download_field(),
            learn_more: None,
            release_notes: None,
        }
    }
}

fn lookup<'a>(node: &'a Value, attribute: &str) -> Option<&'a Value> {
    if attribute.starts_with('/') {
        node.pointer(attribute)
    } else {
        node.get(attribute)
    }
}

fn required_text(node: &Value, attribute: &str) -> Result<String, EndpointError> {
    match lookup(node, attribute) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(EndpointError::malformed(
            OPERATION,
            format!("attribute `{attribute}` is not a string: {other}"),
        )),
        None => Err(EndpointError::malformed(
            OPERATION,
            format!("attribute `{attribute}` is missing"),
        )),
    }
}

/// Optional attributes never fail the release; a value of the wrong type is
/// logged and treated as absent.
fn optional_text(node: &Value, attribute: Option<&str>) -> Option<String> {
    let attribute = attribute?;
    match lookup(node, attribute)? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => {
            debug!("Ignoring optional attribute `{attribute}`, expected a string: {other}");
            None
        }
    }
}

fn version_text(node: &Value, attribute: &str) -> Result<String, EndpointError> {
    match lookup(node, attribute) {
        Some(Value::Number(number)) => Ok(number.to_string()),
        _ => required_text(node, attribute),
    }
}

/// Parse a self-hosted release document.
///
/// # Errors
/// Returns [`EndpointError::NoQualifyingRelease`] for an empty array and
/// [`EndpointError::MalformedPayload`] when the node type or a required
/// attribute does not match the configuration.
pub fn parse_release(
    body: &str,
    shape: JsonShape,
    fields: &JsonFields,
) -> Result<ReleaseInfo, EndpointError> {
    let document: Value =
        serde_json::from_str(body).map_err(|error| EndpointError::malformed_from(OPERATION, error))?;

    let node = match (shape, &document) {
        (JsonShape::Object, Value::Object(_)) => &document,
        (JsonShape::Array, Value::Array(items)) => items
            .first()
            .ok_or_else(|| EndpointError::no_release("release array is empty"))?,
        (JsonShape::Object, _) => {
            return Err(EndpointError::malformed(OPERATION, "expected a JSON object"));
        }
        (JsonShape::Array, _) => {
            return Err(EndpointError::malformed(OPERATION, "expected a JSON array"));
        }
    };

    let mut release = ReleaseInfo::new(
        version_text(node, &fields.version)?,
        required_text(node, &fields.download_url)?,
    );
    release.html_url = optional_text(node, fields.learn_more.as_deref());
    release.body = optional_text(node, fields.release_notes.as_deref());
    Ok(release)
}

/// A self-hosted JSON document describing the latest build.
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    name: String,
    client: reqwest::Client,
    url: String,
    method: reqwest::Method,
    headers: Vec<AuthHeader>,
    shape: JsonShape,
    fields: JsonFields,
    user_agent: String,
}

impl JsonEndpoint {
    pub fn new(client: reqwest::Client, url: impl Into<String>, shape: JsonShape) -> Self {
        let url = url.into();
        Self {
            name: format!("json:{url}"),
            client,
            url,
            method: reqwest::Method::GET,
            headers: Vec::new(),
            shape,
            fields: JsonFields::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: JsonFields) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: reqwest::Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(AuthHeader::new(name, value));
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl Endpoint for JsonEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_release(&self) -> Result<ReleaseInfo, EndpointError> {
        debug!("Fetching JSON release document {} {}", self.method, self.url);

        let request = self
            .client
            .request(self.method.clone(), &self.url)
            .header("User-Agent", self.user_agent.as_str());
        let body = http::fetch_text(http::with_headers(request, &self.headers), OPERATION).await?;

        parse_release(&body, self.shape, &self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> JsonFields {
        JsonFields {
            version: "latestVersion".to_string(),
            download_url: "url".to_string(),
            learn_more: Some("learnMore".to_string()),
            release_notes: Some("releaseNotes".to_string()),
        }
    }

    #[test]
    fn object_shape_reads_configured_attributes() {
        let body = r#"{
            "latestVersion": "2.3.0",
            "url": "https://cdn.example.com/app-2.3.0.apk",
            "learnMore": "https://example.com/changelog",
            "releaseNotes": "Faster sync"
        }"#;

        let release = parse_release(body, JsonShape::Object, &fields())
            .expect("object document should parse");

        assert_eq!(release.version_tag, "2.3.0");
        assert_eq!(release.download_url, "https://cdn.example.com/app-2.3.0.apk");
        assert_eq!(release.html_url.as_deref(), Some("https://example.com/changelog"));
        assert_eq!(release.body.as_deref(), Some("Faster sync"));
    }

    #[test]
    fn array_shape_reads_first_element_only() {
        let body = r#"[
            { "latestVersion": 41, "url": "https://cdn.example.com/41.apk" },
            { "latestVersion": 40, "url": "https://cdn.example.com/40.apk" }
        ]"#;

        let release =
            parse_release(body, JsonShape::Array, &fields()).expect("array document should parse");

        assert_eq!(release.version_tag, "41");
        assert_eq!(release.download_url, "https://cdn.example.com/41.apk");
        assert!(release.body.is_none());
    }

    #[test]
    fn empty_array_has_no_qualifying_release() {
        let error = parse_release("[]", JsonShape::Array, &fields()).expect_err("empty array");

        assert!(matches!(error, EndpointError::NoQualifyingRelease { .. }));
    }

    #[test]
    fn wrong_node_type_is_malformed() {
        let object_as_array = parse_release(r#"{ "latestVersion": "1" }"#, JsonShape::Array, &fields())
            .expect_err("object where an array was expected");
        let array_as_object = parse_release("[]", JsonShape::Object, &fields())
            .expect_err("array where an object was expected");

        assert!(matches!(object_as_array, EndpointError::MalformedPayload { .. }));
        assert!(matches!(array_as_object, EndpointError::MalformedPayload { .. }));
    }

    #[test]
    fn missing_download_attribute_is_malformed() {
        let error = parse_release(r#"{ "latestVersion": "1.0" }"#, JsonShape::Object, &fields())
            .expect_err("download url missing");

        assert_eq!(
            error,
            EndpointError::malformed(OPERATION, "attribute `url` is missing")
        );
    }

    #[test]
    fn non_string_optional_attributes_are_ignored() {
        let body = r#"{
            "latestVersion": "2.4.0",
            "url": "https://cdn.example.com/app-2.4.0.apk",
            "learnMore": 404,
            "releaseNotes": ["Faster sync", "Dark mode"]
        }"#;

        let release = parse_release(body, JsonShape::Object, &fields())
            .expect("optional attributes do not fail the release");

        assert_eq!(release.version_tag, "2.4.0");
        assert!(release.html_url.is_none());
        assert!(release.body.is_none());
    }

    #[test]
    fn pointer_attributes_reach_nested_values() {
        let fields = JsonFields {
            version: "/android/versionCode".to_string(),
            download_url: "/android/apk".to_string(),
            ..JsonFields::default()
        };
        let body = r#"{ "android": { "versionCode": 1.5, "apk": "https://cdn.example.com/a.apk" } }"#;

        let release =
            parse_release(body, JsonShape::Object, &fields).expect("nested document should parse");

        assert_eq!(release.version_tag, "1.5");
        assert_eq!(release.download_url, "https://cdn.example.com/a.apk");
    }
}
