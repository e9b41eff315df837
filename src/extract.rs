//! Readable-content extraction. Thin wrapper over the `readability` crate.

use crate::model::{ExtractedArticle, RawPage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Could not find readable content at {url}: {reason}")]
    Unreadable { url: String, reason: String },

    #[error("Readable content at {url} is empty.")]
    Empty { url: String },
}

/// Turns a raw page into title + content fragment.
pub trait Extractor {
    fn extract(&self, page: RawPage) -> Result<ExtractedArticle, ExtractionError>;
}

/// Readability-style extraction; relative links resolve against the page URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Readability;

impl Extractor for Readability {
    fn extract(&self, mut page: RawPage) -> Result<ExtractedArticle, ExtractionError> {
        let product =
            readability::extractor::extract(&mut page.body, &page.url).map_err(|e| {
                ExtractionError::Unreadable {
                    url: page.url.to_string(),
                    reason: e.to_string(),
                }
            })?;
        if product.content.trim().is_empty() {
            return Err(ExtractionError::Empty {
                url: page.url.to_string(),
            });
        }
        Ok(ExtractedArticle {
            title: product.title.trim().to_string(),
            content: product.content,
            url: page.url,
        })
    }
}
