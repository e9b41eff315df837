//! Values that flow through the pipeline: raw page -> extracted article -> sanitized chapter.

use std::fmt;
use std::io::{Cursor, Read};
use url::Url;

/// Raw HTML for one URL, as handed from a fetcher to the extractor.
///
/// The body is a byte stream: the live HTTP response for direct fetches, an
/// in-memory buffer for rendered ones.
pub struct RawPage {
    pub url: Url,
    pub body: Box<dyn Read>,
}

impl RawPage {
    pub fn new(url: Url, body: impl Read + 'static) -> Self {
        Self {
            url,
            body: Box::new(body),
        }
    }

    /// Page whose markup is already in memory (rendered documents, tests).
    pub fn from_html(url: Url, html: impl Into<String>) -> Self {
        Self::new(url, Cursor::new(html.into().into_bytes()))
    }
}

impl fmt::Debug for RawPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawPage")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

/// Readable content of one page. `content` is an HTML fragment and may still
/// carry boilerplate the extractor missed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: String,
    pub content: String,
    pub url: Url,
}

/// One chapter ready for the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedChapter {
    pub title: String,
    pub content: String,
    /// Derived from the title; see [`slugify`]. Not unique across a book.
    pub slug: String,
}

impl From<ExtractedArticle> for SanitizedChapter {
    fn from(article: ExtractedArticle) -> Self {
        let slug = slugify(&article.title);
        Self {
            title: article.title,
            content: article.content,
            slug,
        }
    }
}

/// Lowercase the title and turn every space into `-`. Nothing else is touched.
pub fn slugify(title: &str) -> String {
    title.to_lowercase().replace(' ', "-")
}
