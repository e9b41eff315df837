//! Page retrieval. Two strategies behind one trait, picked once per run from configuration.

mod direct;
mod error;
mod rendered;

pub use direct::DirectFetcher;
pub use error::FetchError;
pub use rendered::{ChromeRenderer, PageRenderer, RenderedFetcher};

use crate::model::RawPage;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;

/// Retrieves raw HTML for one URL.
pub trait Fetcher {
    fn fetch(&mut self, url: &Url) -> Result<RawPage, FetchError>;
}

/// How pages are retrieved. Static for a whole run; there is no fallback between strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Plain HTTP GET.
    DirectHttp,
    /// Headless browser, for pages whose content only exists after scripts run.
    RenderedBrowser,
}

impl FetchStrategy {
    pub fn for_scripted(requires_scripted_fetch: bool) -> Self {
        if requires_scripted_fetch {
            FetchStrategy::RenderedBrowser
        } else {
            FetchStrategy::DirectHttp
        }
    }
}

/// Builds the fetcher for a strategy. Called once per run, after validation.
pub trait Connect {
    fn connect(&self, strategy: FetchStrategy) -> Result<Box<dyn Fetcher>, FetchError>;
}

/// Options shared by both strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub user_agent: String,
    /// HTTP request timeout.
    pub timeout_secs: u64,
    /// Upper bound for navigate + serialize in the browser.
    pub render_timeout_secs: u64,
    /// Chromium binary; auto-detected when unset.
    pub browser_executable: Option<PathBuf>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            browser_executable: None,
        }
    }
}

impl Connect for FetchOptions {
    fn connect(&self, strategy: FetchStrategy) -> Result<Box<dyn Fetcher>, FetchError> {
        match strategy {
            FetchStrategy::DirectHttp => Ok(Box::new(DirectFetcher::new(self)?)),
            FetchStrategy::RenderedBrowser => Ok(Box::new(RenderedFetcher::new(
                ChromeRenderer::new(self),
            ))),
        }
    }
}

/// Parse a URL pulled from the source. Failures are reported as fetch errors.
pub fn parse_url(input: &str) -> Result<Url, FetchError> {
    Url::parse(input).map_err(|e| FetchError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })
}
