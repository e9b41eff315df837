//! Book recipes: a TOML (or JSON) file describing one book and where its chapters live.
//!
//! ```toml
//! title = "Collected Essays"
//! author = "A. Writer"
//! cover_image = "cover.jpg"
//! url_template = "https://example.com/essays/{n}"
//! first = 1
//! last = 12
//! delay_secs = 5
//! strip_patterns = ['<p>\s*Share this\s*</p>']
//! ```

use crate::epublifier::{BookSpec, UrlSource};
use crate::sanitize::{DefaultSanitizer, PatternSanitizer, Sanitizer};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder replaced by the chapter number in `url_template`.
pub const TEMPLATE_PLACEHOLDER: &str = "{n}";

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Cannot read recipe {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid recipe {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid recipe {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid chapter URLs: {0}")]
    Urls(String),

    #[error("Invalid strip pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Recipe {
    pub title: String,
    pub author: String,
    pub cover_image: Option<PathBuf>,
    /// Stylesheet for the cover page; a built-in one is used when unset.
    pub cover_css: Option<PathBuf>,
    /// Chapter URLs in reading order. Mutually exclusive with `url_template`.
    pub urls: Vec<String>,
    /// URL with a `{n}` placeholder, expanded for every n in `first..=last`.
    pub url_template: Option<String>,
    pub first: Option<u32>,
    pub last: Option<u32>,
    /// Pause between fetches, in seconds.
    pub delay_secs: u64,
    /// Pages need a headless browser to run their scripts.
    pub requires_js: bool,
    pub output: Option<PathBuf>,
    /// Regexes cut from each chapter after the default sanitizer.
    pub strip_patterns: Vec<String>,
    /// Prepend an `<h1>` with the chapter title.
    pub title_heading: bool,
}

impl Recipe {
    /// Load from `path`. Files ending in `.json` are JSON, anything else TOML.
    /// Relative paths inside are resolved against the recipe's directory.
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let s = std::fs::read_to_string(path).map_err(|e| RecipeError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let mut recipe: Recipe = if is_json {
            serde_json::from_str(&s).map_err(|e| RecipeError::Json {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            toml::from_str(&s).map_err(|e| RecipeError::Toml {
                path: path.to_path_buf(),
                source: e,
            })?
        };
        if let Some(base) = path.parent() {
            recipe.resolve_paths(base);
        }
        Ok(recipe)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for p in [&mut self.cover_image, &mut self.cover_css, &mut self.output]
            .into_iter()
            .flatten()
        {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    /// Chapter URLs in order, from either `urls` or the expanded template.
    pub fn urls(&self) -> Result<Vec<String>, RecipeError> {
        let Some(template) = self.url_template.as_deref() else {
            return Ok(self.urls.clone());
        };
        if !self.urls.is_empty() {
            return Err(RecipeError::Urls(
                "set either `urls` or `url_template`, not both".to_string(),
            ));
        }
        if !template.contains(TEMPLATE_PLACEHOLDER) {
            return Err(RecipeError::Urls(format!(
                "`url_template` must contain {}",
                TEMPLATE_PLACEHOLDER
            )));
        }
        let (Some(first), Some(last)) = (self.first, self.last) else {
            return Err(RecipeError::Urls(
                "`url_template` needs both `first` and `last`".to_string(),
            ));
        };
        if first > last {
            return Err(RecipeError::Urls(format!(
                "`first` ({}) is after `last` ({})",
                first, last
            )));
        }
        Ok((first..=last)
            .map(|n| template.replace(TEMPLATE_PLACEHOLDER, &n.to_string()))
            .collect())
    }

    /// The sanitizer this recipe asks for, or None for the default one.
    pub fn sanitizer(&self) -> Result<Option<Box<dyn Sanitizer>>, RecipeError> {
        if self.strip_patterns.is_empty() && !self.title_heading {
            return Ok(None);
        }
        let base = DefaultSanitizer::new().title_heading(self.title_heading);
        Ok(Some(Box::new(PatternSanitizer::new(
            base,
            self.strip_patterns.as_slice(),
        )?)))
    }

    /// Turn the recipe into a book spec pulling from `source` and saving to `save_path`.
    pub fn into_spec(
        self,
        source: Box<dyn UrlSource>,
        save_path: PathBuf,
    ) -> Result<BookSpec, RecipeError> {
        let sanitizer = self.sanitizer()?;
        Ok(BookSpec {
            title: self.title,
            author: self.author,
            cover_image_path: self.cover_image,
            cover_css_path: self.cover_css,
            url_source: Some(source),
            sanitizer,
            save_path: Some(save_path),
            requires_scripted_fetch: self.requires_js,
        })
    }
}
