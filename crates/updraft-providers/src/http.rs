use std::time::Duration;

use log::debug;
use updraft_core::{AuthHeader, EndpointError};

pub const DEFAULT_USER_AGENT: &str = concat!("updraft/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client shared by every endpoint of a chain.
///
/// # Errors
/// Returns an error when the TLS backend cannot be initialized.
pub fn build_client(
    user_agent: &str,
    timeout: Duration,
    connect_timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .user_agent(user_agent)
        .build()
}

pub(crate) fn with_headers(
    mut request: reqwest::RequestBuilder,
    headers: &[AuthHeader],
) -> reqwest::RequestBuilder {
    for header in headers {
        request = request.header(header.name.as_str(), header.value.as_str());
    }
    request
}

/// Send `request` and return the body of a successful response.
pub(crate) async fn fetch_text(
    request: reqwest::RequestBuilder,
    operation: &'static str,
) -> Result<String, EndpointError> {
    let response = request
        .send()
        .await
        .map_err(|error| EndpointError::network_from(operation, error))?;

    let status = response.status();
    if !status.is_success() {
        let body_snippet = response
            .text()
            .await
            .ok()
            .map(|body| response_snippet(&body, 160))
            .unwrap_or_default();
        return Err(EndpointError::http_status(
            operation,
            status.as_u16(),
            format!("HTTP {status}{body_snippet}"),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|error| EndpointError::network_from(operation, error))?;
    debug!("{operation}: received {} bytes", body.len());
    Ok(body)
}

pub(crate) fn trim_base(url: impl Into<String>) -> String {
    let mut url = url.into();
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
