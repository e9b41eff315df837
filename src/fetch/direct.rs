//! Plain HTTP strategy: one blocking GET per URL, body streamed to the extractor.

use crate::fetch::{FetchError, FetchOptions, Fetcher};
use crate::model::RawPage;
use reqwest::header::ACCEPT;
use std::time::Duration;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Blocking HTTP fetcher. Sends `Accept: text/html` and a desktop browser User-Agent.
#[derive(Debug)]
pub struct DirectFetcher {
    inner: reqwest::blocking::Client,
}

impl DirectFetcher {
    /// Build the client from shared fetch options (User-Agent, timeout).
    pub fn new(options: &FetchOptions) -> Result<Self, FetchError> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(Duration::from_secs(options.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::Client { source: e })?;
        Ok(Self { inner })
    }
}

impl Fetcher for DirectFetcher {
    fn fetch(&mut self, url: &Url) -> Result<RawPage, FetchError> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .inner
            .get(url.clone())
            .header(ACCEPT, "text/html")
            .send()
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(RawPage::new(url.clone(), response))
    }
}
