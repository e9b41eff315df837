//! Site-specific cleanup on top of the default pass: regexes whose matches are cut
//! from the sanitized content. Built from a book recipe's `strip_patterns`.

use crate::model::ExtractedArticle;
use crate::sanitize::{DefaultSanitizer, SanitizationError, Sanitizer};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct PatternSanitizer {
    base: DefaultSanitizer,
    patterns: Vec<Regex>,
}

impl PatternSanitizer {
    /// Compile `patterns`. Fails on the first invalid regex.
    pub fn new<S: AsRef<str>>(
        base: DefaultSanitizer,
        patterns: &[S],
    ) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { base, patterns })
    }
}

impl Sanitizer for PatternSanitizer {
    fn sanitize(&self, article: ExtractedArticle) -> Result<ExtractedArticle, SanitizationError> {
        let mut article = self.base.sanitize(article)?;
        for re in &self.patterns {
            let stripped = re.replace_all(&article.content, "").into_owned();
            article.content = stripped;
        }
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn article(content: &str) -> ExtractedArticle {
        ExtractedArticle {
            title: "Chapter 1365".to_string(),
            content: content.to_string(),
            url: Url::parse("https://novels.example/ch/1365").unwrap(),
        }
    }

    #[test]
    fn strips_matches_after_default_pass() {
        let sanitizer = PatternSanitizer::new(
            DefaultSanitizer::new(),
            &[r"\s*<p>\s*<span>\s*Tap the screen to use reading tools\s*</span>\s*</p>"],
        )
        .unwrap();
        let out = sanitizer
            .sanitize(article(
                "<html><head></head><body><p>Story.</p><p> <span>Tap the screen to use reading tools</span></p></body></html>",
            ))
            .unwrap();
        assert_eq!(out.content, "<body><p>Story.</p></body>");
    }

    #[test]
    fn no_patterns_behaves_like_default() {
        let sanitizer = PatternSanitizer::new::<&str>(DefaultSanitizer::new(), &[]).unwrap();
        let input = article("<p>x</p><dialog></dialog><p>y</p>");
        let expected = DefaultSanitizer::new().sanitize(input.clone()).unwrap();
        assert_eq!(sanitizer.sanitize(input).unwrap(), expected);
    }

    #[test]
    fn heading_option_is_kept() {
        let sanitizer =
            PatternSanitizer::new(DefaultSanitizer::new().title_heading(true), &["Ad:.*?\\."]).unwrap();
        let out = sanitizer.sanitize(article("<p>Ad: buy now. Text</p>")).unwrap();
        assert_eq!(out.content, "<body><h1>Chapter 1365</h1><p> Text</p></body>");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(PatternSanitizer::new(DefaultSanitizer::new(), &["("]).is_err());
    }
}
