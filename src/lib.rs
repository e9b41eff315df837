//! epublifier: fetch an ordered list of web articles, keep their readable content,
//! and bind them into a single EPUB.

pub mod cli;
pub mod config;
pub mod epub;
pub mod epublifier;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod recipe;
pub mod sanitize;

// Re-exports for CLI and consumers.
pub use epub::{AssemblyError, Book, EpubOptions, WriteError};
pub use epublifier::{
    BookSpec, CreateError, CreateSummary, Epublifier, Paced, PipelineOptions, Stage, UrlList,
    UrlSource, ValidationError,
};
pub use extract::{ExtractionError, Extractor, Readability};
pub use fetch::{Connect, FetchError, FetchOptions, FetchStrategy, Fetcher};
pub use model::{slugify, ExtractedArticle, RawPage, SanitizedChapter};
pub use recipe::{Recipe, RecipeError};
pub use sanitize::{DefaultSanitizer, PatternSanitizer, SanitizationError, Sanitizer};
