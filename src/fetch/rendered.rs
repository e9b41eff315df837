//! Script-rendered strategy: a throwaway headless Chromium per URL.
//!
//! Every render launches its own browser process with its own profile directory,
//! so cookies and storage never carry over between pages. The browser is closed
//! whether the render succeeded, failed, or timed out.

use crate::fetch::{FetchError, FetchOptions, Fetcher};
use crate::model::RawPage;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Produces the fully rendered outer HTML of one URL.
pub trait PageRenderer {
    fn render(&mut self, url: &Url) -> Result<String, FetchError>;
}

/// Fetcher that delegates every URL to a [`PageRenderer`], exactly once per URL.
pub struct RenderedFetcher<R> {
    renderer: R,
}

impl<R: PageRenderer> RenderedFetcher<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }
}

impl<R: PageRenderer> Fetcher for RenderedFetcher<R> {
    fn fetch(&mut self, url: &Url) -> Result<RawPage, FetchError> {
        tracing::debug!(url = %url, "render");
        let html = self.renderer.render(url)?;
        Ok(RawPage::from_html(url.clone(), html))
    }
}

/// Headless Chromium driven over CDP.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    user_agent: String,
    timeout: Duration,
    executable: Option<PathBuf>,
}

impl ChromeRenderer {
    pub fn new(options: &FetchOptions) -> Self {
        Self {
            user_agent: options.user_agent.clone(),
            timeout: Duration::from_secs(options.render_timeout_secs),
            executable: options.browser_executable.clone(),
        }
    }

    fn browser_config(&self, profile: &std::path::Path) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile)
            .arg(format!("--user-agent={}", self.user_agent));
        if let Some(ref exe) = self.executable {
            builder = builder.chrome_executable(exe);
        }
        builder
            .build()
            .map_err(|reason| FetchError::BrowserConfig { reason })
    }

    async fn render_isolated(&self, url: &Url) -> Result<String, FetchError> {
        let profile = tempfile::Builder::new()
            .prefix("epublifier-profile-")
            .tempdir()
            .map_err(|e| FetchError::Profile { source: e })?;
        let config = self.browser_config(profile.path())?;
        let (mut browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| FetchError::Browser {
                    url: url.to_string(),
                    source: e,
                })?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let rendered = tokio::time::timeout(self.timeout, navigate_and_serialize(&browser, url)).await;

        if let Err(e) = browser.close().await {
            tracing::warn!(url = %url, error = %e, "could not close headless browser");
        }
        if let Err(e) = browser.wait().await {
            tracing::warn!(url = %url, error = %e, "headless browser did not exit cleanly");
        }
        events.abort();
        drop(profile);

        match rendered {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

async fn navigate_and_serialize(browser: &Browser, url: &Url) -> Result<String, FetchError> {
    let cdp = |e| FetchError::Browser {
        url: url.to_string(),
        source: e,
    };
    let page = browser.new_page(url.as_str()).await.map_err(cdp)?;
    page.wait_for_navigation().await.map_err(cdp)?;
    page.content().await.map_err(cdp)
}

impl PageRenderer for ChromeRenderer {
    fn render(&mut self, url: &Url) -> Result<String, FetchError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FetchError::Runtime { source: e })?;
        runtime.block_on(self.render_isolated(url))
    }
}
