//! Chapter sanitizers. Run once per chapter, after extraction and before assembly.

pub mod dom;
mod pattern;

pub use pattern::PatternSanitizer;

use crate::model::ExtractedArticle;
use dom::{Element, Node};
use thiserror::Error;

/// Tag a reader-mode browser extension leaves behind in saved pages. It is
/// always followed by one more node belonging to the same overlay.
pub const READER_ARTIFACT_TAG: &str = "dialog";

/// The content container kept by the default sanitizer.
pub const CONTENT_CONTAINER_TAG: &str = "body";

#[derive(Debug, Error)]
pub enum SanitizationError {
    #[error("No <{tag}> element in chapter content from {url}.")]
    MissingContainer { tag: &'static str, url: String },

    #[error("{0}")]
    Custom(String),
}

/// Transforms an extracted article. Implemented by [`DefaultSanitizer`],
/// [`PatternSanitizer`], and any `Fn(ExtractedArticle) -> Result<ExtractedArticle, SanitizationError>`.
pub trait Sanitizer {
    fn sanitize(&self, article: ExtractedArticle) -> Result<ExtractedArticle, SanitizationError>;
}

impl<F> Sanitizer for F
where
    F: Fn(ExtractedArticle) -> Result<ExtractedArticle, SanitizationError>,
{
    fn sanitize(&self, article: ExtractedArticle) -> Result<ExtractedArticle, SanitizationError> {
        self(article)
    }
}

/// Keeps only the `<body>` subtree of the content, minus reader-mode artifacts,
/// scripts, `<noscript>` fallbacks, other raw-text elements, and comments.
///
/// Pure and idempotent: its own output passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSanitizer {
    title_heading: bool,
}

impl DefaultSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an `<h1>` with the chapter title as the first child of the body.
    pub fn title_heading(mut self, enabled: bool) -> Self {
        self.title_heading = enabled;
        self
    }
}

impl Sanitizer for DefaultSanitizer {
    fn sanitize(
        &self,
        mut article: ExtractedArticle,
    ) -> Result<ExtractedArticle, SanitizationError> {
        let mut doc = dom::parse_document(&article.content);
        doc.remove_with_trailing_sibling(READER_ARTIFACT_TAG);
        doc.remove_where(|node| node.is_raw_text_element() || matches!(node, Node::Comment(_)));
        let body = doc.find_first_mut(CONTENT_CONTAINER_TAG).ok_or_else(|| {
            SanitizationError::MissingContainer {
                tag: CONTENT_CONTAINER_TAG,
                url: article.url.to_string(),
            }
        })?;
        if self.title_heading {
            body.children
                .insert(0, Node::Element(Element::with_text("h1", article.title.as_str())));
        }
        article.content = body.to_html();
        Ok(article)
    }
}
