//! The pipeline driver: validate a [`BookSpec`], pull URLs, fetch -> extract ->
//! sanitize -> append each one, then write the book once.

use crate::epub::{AssemblyError, Book, EpubOptions, WriteError};
use crate::extract::{ExtractionError, Extractor, Readability};
use crate::fetch::{parse_url, Connect, FetchError, FetchOptions, FetchStrategy};
use crate::model::SanitizedChapter;
use crate::sanitize::{DefaultSanitizer, SanitizationError, Sanitizer};
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Stylesheet for the cover page when the book names none.
pub const DEFAULT_COVER_CSS: &str = "body {
  background-color: #FFFFFF;
  margin-bottom: 0px;
  margin-left: 0px;
  margin-right: 0px;
  margin-top: 0px;
  text-align: center;
}
img {
  max-height: 100%;
  max-width: 100%;
}
";

/// Yields chapter URLs in reading order. An empty string ends the sequence.
pub trait UrlSource {
    fn next_url(&mut self) -> String;
}

impl<F> UrlSource for F
where
    F: FnMut() -> String,
{
    fn next_url(&mut self) -> String {
        self()
    }
}

/// A fixed list of URLs. Blank entries are dropped up front so they cannot end
/// the sequence early.
#[derive(Debug, Clone, Default)]
pub struct UrlList {
    urls: VecDeque<String>,
}

impl UrlList {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls
                .into_iter()
                .map(Into::into)
                .filter(|u: &String| !u.trim().is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }
}

impl UrlSource for UrlList {
    fn next_url(&mut self) -> String {
        self.urls.pop_front().unwrap_or_default()
    }
}

/// Sleeps `delay` before every pull except the first.
#[derive(Debug)]
pub struct Paced<S> {
    inner: S,
    delay: Duration,
    pulled: bool,
}

impl<S: UrlSource> Paced<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            pulled: false,
        }
    }
}

impl<S: UrlSource> UrlSource for Paced<S> {
    fn next_url(&mut self) -> String {
        if self.pulled && !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.pulled = true;
        self.inner.next_url()
    }
}

/// Everything needed to build one book.
#[derive(Default)]
pub struct BookSpec {
    pub title: String,
    pub author: String,
    pub cover_image_path: Option<PathBuf>,
    /// Used only with a cover image. Defaults to [`DEFAULT_COVER_CSS`].
    pub cover_css_path: Option<PathBuf>,
    pub url_source: Option<Box<dyn UrlSource>>,
    /// Replaces the default sanitizer for this run.
    pub sanitizer: Option<Box<dyn Sanitizer>>,
    pub save_path: Option<PathBuf>,
    pub requires_scripted_fetch: bool,
}

impl fmt::Debug for BookSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookSpec")
            .field("title", &self.title)
            .field("author", &self.author)
            .field("cover_image_path", &self.cover_image_path)
            .field("cover_css_path", &self.cover_css_path)
            .field("url_source", &self.url_source.is_some())
            .field("sanitizer", &self.sanitizer.is_some())
            .field("save_path", &self.save_path)
            .field("requires_scripted_fetch", &self.requires_scripted_fetch)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("book title is required")]
    MissingTitle,
    #[error("book author is required")]
    MissingAuthor,
    #[error("save path is required")]
    MissingSavePath,
    #[error("a URL source is required")]
    MissingUrlSource,
}

impl BookSpec {
    /// Every missing required field, in the order title, author, save path, URL source.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push(ValidationError::MissingTitle);
        }
        if self.author.trim().is_empty() {
            errors.push(ValidationError::MissingAuthor);
        }
        if self
            .save_path
            .as_ref()
            .map_or(true, |p| p.as_os_str().is_empty())
        {
            errors.push(ValidationError::MissingSavePath);
        }
        if self.url_source.is_none() {
            errors.push(ValidationError::MissingUrlSource);
        }
        errors
    }
}

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    SettingCover,
    Iterating,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::SettingCover => "setting cover",
            Stage::Iterating => "iterating",
            Stage::Writing => "writing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("Invalid book spec: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Cannot set up fetching: {0}")]
    Connect(#[source] FetchError),

    #[error("Fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Extracting {url} failed: {source}")]
    Extraction {
        url: String,
        #[source]
        source: ExtractionError,
    },

    #[error("Sanitizing {url} failed: {source}")]
    Sanitization {
        url: String,
        #[source]
        source: SanitizationError,
    },

    #[error("Setting cover failed: {0}")]
    Assembly(#[source] AssemblyError),

    #[error("Writing book failed: {0}")]
    Write(#[source] WriteError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CreateError {
    /// The stage the run was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            CreateError::Validation(_) => Stage::Validating,
            CreateError::Assembly(_) => Stage::SettingCover,
            CreateError::Connect(_)
            | CreateError::Fetch { .. }
            | CreateError::Extraction { .. }
            | CreateError::Sanitization { .. } => Stage::Iterating,
            CreateError::Write(_) => Stage::Writing,
        }
    }

    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            CreateError::Validation(errors) => errors,
            _ => &[],
        }
    }

    /// URL of the chapter that failed, if the failure was tied to one.
    pub fn url(&self) -> Option<&str> {
        match self {
            CreateError::Fetch { url, .. }
            | CreateError::Extraction { url, .. }
            | CreateError::Sanitization { url, .. } => Some(url),
            _ => None,
        }
    }
}

/// Knobs that are not part of a single book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub fetch: FetchOptions,
    /// Directory for run-scoped temporaries. System temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    pub epub: EpubOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSummary {
    pub path: PathBuf,
    /// Chapter titles in book order.
    pub chapters: Vec<String>,
}

pub struct Epublifier {
    options: PipelineOptions,
    connector: Box<dyn Connect>,
    extractor: Box<dyn Extractor>,
}

impl fmt::Debug for Epublifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Epublifier")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Epublifier {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

impl Epublifier {
    pub fn new(options: PipelineOptions) -> Self {
        let connector = Box::new(options.fetch.clone());
        Self {
            options,
            connector,
            extractor: Box::new(Readability),
        }
    }

    pub fn with_connector(mut self, connector: Box<dyn Connect>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the whole pipeline for one book. The EPUB is written only if every
    /// chapter made it through; on error nothing is left at the save path.
    pub fn create(&self, spec: BookSpec) -> Result<CreateSummary, CreateError> {
        let result = self.run(spec);
        match &result {
            Ok(summary) => {
                enter(Stage::Done);
                info!(path = %summary.path.display(), chapters = summary.chapters.len(), "book created");
            }
            Err(e) => {
                enter(Stage::Failed);
                debug!(stage = %e.stage(), error = %e, "run aborted");
            }
        }
        result
    }

    fn run(&self, spec: BookSpec) -> Result<CreateSummary, CreateError> {
        enter(Stage::Validating);
        let errors = spec.validate();
        if !errors.is_empty() {
            return Err(CreateError::Validation(errors));
        }
        let BookSpec {
            title,
            author,
            cover_image_path,
            cover_css_path,
            url_source,
            sanitizer,
            save_path,
            requires_scripted_fetch,
        } = spec;
        let (Some(mut source), Some(save_path)) = (url_source, save_path) else {
            return Err(CreateError::Validation(vec![ValidationError::MissingUrlSource]));
        };

        let mut book = Book::new(title, author);

        // Deleted when the run returns, whatever the outcome.
        let mut _cover_css: Option<NamedTempFile> = None;
        if let Some(image) = cover_image_path {
            enter(Stage::SettingCover);
            let css = match cover_css_path {
                Some(path) => path,
                None => {
                    let tmp = self
                        .default_cover_css()
                        .map_err(|e| CreateError::Assembly(AssemblyError::Scratch { source: e }))?;
                    let path = tmp.path().to_path_buf();
                    _cover_css = Some(tmp);
                    path
                }
            };
            book.set_cover(&image, &css).map_err(CreateError::Assembly)?;
        }

        enter(Stage::Iterating);
        let strategy = FetchStrategy::for_scripted(requires_scripted_fetch);
        let mut fetcher = self.connector.connect(strategy).map_err(CreateError::Connect)?;
        let default_sanitizer = DefaultSanitizer::new();
        let sanitizer: &dyn Sanitizer = sanitizer.as_deref().unwrap_or(&default_sanitizer);

        loop {
            let raw = source.next_url();
            if raw.is_empty() {
                break;
            }
            let url = parse_url(&raw).map_err(|e| CreateError::Fetch {
                url: raw.clone(),
                source: e,
            })?;
            debug!(url = %url, ?strategy, "fetching");
            let page = fetcher.fetch(&url).map_err(|e| CreateError::Fetch {
                url: raw.clone(),
                source: e,
            })?;
            let article = self
                .extractor
                .extract(page)
                .map_err(|e| CreateError::Extraction {
                    url: raw.clone(),
                    source: e,
                })?;
            let article = sanitizer
                .sanitize(article)
                .map_err(|e| CreateError::Sanitization {
                    url: raw.clone(),
                    source: e,
                })?;
            let chapter = SanitizedChapter::from(article);
            let file = book.add_chapter(chapter.content, chapter.title, chapter.slug, None);
            info!(url = %raw, file = %file, "chapter appended");
        }

        enter(Stage::Writing);
        book.write(&save_path, self.options.epub)
            .map_err(CreateError::Write)?;
        Ok(CreateSummary {
            path: save_path,
            chapters: book.chapters().iter().map(|c| c.title.clone()).collect(),
        })
    }

    fn default_cover_css(&self) -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cover-").suffix(".css");
        let mut tmp = match self.options.scratch_dir.as_deref() {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        tmp.write_all(DEFAULT_COVER_CSS.as_bytes())?;
        tmp.flush()?;
        Ok(tmp)
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "stage");
}
