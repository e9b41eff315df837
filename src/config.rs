//! Optional config file loading. Search order: ./epublifier.toml, then
//! $XDG_CONFIG_HOME/epublifier/config.toml (or ~/.config/epublifier/config.toml).

use crate::epub::EpubOptions;
use crate::epublifier::PipelineOptions;
use crate::fetch::FetchOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct Config {
    /// Output directory when neither -o nor the recipe's `output` is set. Relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// User-Agent for HTTP requests and the headless browser.
    pub user_agent: Option<String>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Bound on navigate + serialize per rendered page, in seconds.
    pub render_timeout_secs: Option<u64>,
    /// Chromium binary for scripted fetching. Auto-detected when unset.
    pub browser_executable: Option<PathBuf>,
    /// Where run-scoped temporary files go.
    pub scratch_dir: Option<PathBuf>,
    /// Write toc.ncx alongside nav.xhtml (default: true).
    pub ncx: Option<bool>,
    /// Include a visible table-of-contents page (default: false).
    pub toc_page: Option<bool>,
}

impl Config {
    /// Pipeline options with this file's keys applied over the defaults.
    pub fn pipeline_options(&self) -> PipelineOptions {
        let fetch_defaults = FetchOptions::default();
        let epub_defaults = EpubOptions::default();
        PipelineOptions {
            fetch: FetchOptions {
                user_agent: self
                    .user_agent
                    .clone()
                    .unwrap_or(fetch_defaults.user_agent),
                timeout_secs: self.timeout_secs.unwrap_or(fetch_defaults.timeout_secs),
                render_timeout_secs: self
                    .render_timeout_secs
                    .unwrap_or(fetch_defaults.render_timeout_secs),
                browser_executable: self.browser_executable.clone(),
            },
            scratch_dir: self.scratch_dir.clone(),
            epub: EpubOptions {
                ncx: self.ncx.unwrap_or(epub_defaults.ncx),
                toc_page: self.toc_page.unwrap_or(epub_defaults.toc_page),
            },
        }
    }
}

/// Candidate config locations in search order.
fn search_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths = vec![cwd.join("epublifier.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("epublifier").join("config.toml"));
    }
    paths
}

/// Read one config file.
pub fn read_config(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

/// First config found on the search path. Missing file returns Ok(None). Invalid TOML
/// or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    for path in search_paths(&cwd) {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            return read_config(&path).map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.render_timeout_secs.is_none());
        assert!(c.browser_executable.is_none());
        assert!(c.scratch_dir.is_none());
        assert!(c.ncx.is_none());
        assert!(c.toc_page.is_none());
        assert_eq!(c.pipeline_options(), PipelineOptions::default());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "out"
            user_agent = "Custom/1.0"
            timeout_secs = 10
            render_timeout_secs = 90
            browser_executable = "/usr/bin/chromium"
            scratch_dir = "/var/tmp"
            ncx = false
            toc_page = true
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(Path::new("out")));
        let options = c.pipeline_options();
        assert_eq!(options.fetch.user_agent, "Custom/1.0");
        assert_eq!(options.fetch.timeout_secs, 10);
        assert_eq!(options.fetch.render_timeout_secs, 90);
        assert_eq!(
            options.fetch.browser_executable.as_deref(),
            Some(Path::new("/usr/bin/chromium"))
        );
        assert_eq!(options.scratch_dir.as_deref(), Some(Path::new("/var/tmp")));
        assert_eq!(
            options.epub,
            EpubOptions {
                ncx: false,
                toc_page: true
            }
        );
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("timeout_secs = 5").unwrap();
        let options = c.pipeline_options();
        assert_eq!(options.fetch.timeout_secs, 5);
        assert_eq!(
            options.fetch.render_timeout_secs,
            FetchOptions::default().render_timeout_secs
        );
        assert_eq!(options.epub, EpubOptions::default());
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
        assert!(toml::from_str::<Config>("retry_count = 3").is_err());
    }

    #[test]
    fn read_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epublifier.toml");
        std::fs::write(&path, "ncx = \"yes\"").unwrap();
        let err = read_config(&path).unwrap_err();
        assert!(err.contains("epublifier.toml"));
        assert!(read_config(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn cwd_file_is_searched_first() {
        let paths = search_paths(Path::new("/work"));
        assert_eq!(paths[0], Path::new("/work/epublifier.toml"));
        assert!(paths
            .iter()
            .skip(1)
            .all(|p| p.ends_with("epublifier/config.toml")));
    }
}
