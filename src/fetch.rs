//! Upstream page retrieval.
//!
//! Fetches the mobile-rendered HTML of a remote article and rewrites its
//! relative links to absolute upstream URLs before the polisher runs, plus a
//! thin JSON passthrough to the remote search API. A timeout or non-success
//! status is a terminal failure for the request; the caller's session state
//! is never touched here, so the identical request can be retried unchanged.
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{
    Client,
    header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
};
use serde_json::Value;

use crate::error::AppError;

// Mobile user-agent so the upstream returns mobile-styled markup, notably on
// the main page.
const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";

const API_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// Everything encodeURIComponent escapes, nothing more.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

pub fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("HTTP client misconfigured!")
}

/// Fetches `https://{host}/wiki/{title}` and absolutizes its relative links.
pub async fn fetch_page(client: &Client, host: &str, title: &str) -> Result<String, AppError> {
    let url = format!("https://{host}/wiki/{}", encode_component(title));

    let response = client
        .get(&url)
        .header(USER_AGENT, MOBILE_UA)
        .header(ACCEPT, ACCEPT_HTML)
        .header(ACCEPT_LANGUAGE, "fr")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AppError::RemoteStatus(response.status()));
    }

    let html = response.text().await?;
    Ok(absolutize(&html, host))
}

/// Passthrough to the remote search API. Search lives on the desktop host,
/// so the mobile `m.` label is dropped.
pub async fn search(client: &Client, host: &str, query: &str) -> Result<Value, AppError> {
    let api_host = host.replacen("m.", "", 1);
    let url = format!(
        "https://{api_host}/w/api.php?action=query&list=search&srsearch={}&format=json",
        encode_component(query)
    );

    let response = client
        .get(&url)
        .header(USER_AGENT, API_UA)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AppError::RemoteStatus(response.status()));
    }

    Ok(response.json().await?)
}

/// Rewrites relative article/asset links to absolute upstream URLs so the
/// polisher sees one uniform `/wiki/` shape.
fn absolutize(html: &str, host: &str) -> String {
    html.replace("href=\"/wiki/", &format!("href=\"https://{host}/wiki/"))
        .replace("href=\"/w/", &format!("href=\"https://{host}/w/"))
        .replace("src=\"/w/", &format!("src=\"https://{host}/w/"))
}
