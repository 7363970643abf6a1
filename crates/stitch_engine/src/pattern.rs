use std::fmt;

use serde::{Deserialize, Serialize};

/// URL match pattern where `*` stands for any run of characters.
///
/// Everything else matches literally, including `?` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlPattern(String);

impl UrlPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, url: &str) -> bool {
        let mut parts = self.0.split('*');
        let Some(first) = parts.next() else {
            return url.is_empty();
        };
        let Some(mut rest) = url.strip_prefix(first) else {
            return false;
        };
        let pieces: Vec<&str> = parts.collect();
        let Some((last, middle)) = pieces.split_last() else {
            // No wildcard at all.
            return rest.is_empty();
        };
        for piece in middle {
            match rest.find(piece) {
                Some(pos) => rest = &rest[pos + piece.len()..],
                None => return false,
            }
        }
        rest.len() >= last.len() && rest.ends_with(last)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_wildcard() {
        let pattern = UrlPattern::new("https://weread.qq.com/web/book/read*");
        assert!(pattern.matches("https://weread.qq.com/web/book/read"));
        assert!(pattern.matches("https://weread.qq.com/web/book/read?b=1&c=2"));
        assert!(!pattern.matches("https://weread.qq.com/web/book/chapter/e_1"));
        assert!(!pattern.matches("http://weread.qq.com/web/book/read"));
    }

    #[test]
    fn inner_wildcards() {
        let pattern = UrlPattern::new("https://*.example.com/*/img.png");
        assert!(pattern.matches("https://cdn.example.com/a/b/img.png"));
        assert!(!pattern.matches("https://cdn.example.com/img.png"));
        assert!(!pattern.matches("https://cdn.example.com/a/img.png.bak"));
    }

    #[test]
    fn literal_pattern_matches_exactly() {
        let pattern = UrlPattern::new("https://a.test/x?y");
        assert!(pattern.matches("https://a.test/x?y"));
        assert!(!pattern.matches("https://a.test/x?yz"));
    }

    #[test]
    fn overlapping_prefix_and_suffix() {
        let pattern = UrlPattern::new("ab*ba");
        assert!(!pattern.matches("aba"));
        assert!(pattern.matches("abba"));
    }
}
