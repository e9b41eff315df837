//! Fetch failures for both strategies.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Could not build HTTP client: {source}")]
    Client { source: reqwest::Error },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    /// Non-2xx responses never reach the extractor.
    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Could not start async runtime for the browser: {source}")]
    Runtime { source: std::io::Error },

    #[error("Could not prepare browser profile directory: {source}")]
    Profile { source: std::io::Error },

    #[error("Invalid browser configuration: {reason}")]
    BrowserConfig { reason: String },

    #[error("Headless browser failed on {url}: {source}")]
    Browser {
        url: String,
        source: chromiumoxide::error::CdpError,
    },

    #[error("Rendering {url} did not finish within {}s", timeout.as_secs())]
    Timeout { url: String, timeout: Duration },
}
