//! Delimited placeholder scanner

use crate::error::ScanError;
use crate::tag::Tag;

pub const DEFAULT_START: &str = "[[";
pub const DEFAULT_END: &str = "]]";

/// Start and end markers of a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    start: String,
    end: String,
}

impl Delimiters {
    /// Create a delimiter pair; both markers must be non-empty
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Option<Self> {
        let start = start.into();
        let end = end.into();
        if start.is_empty() || end.is_empty() {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// The same markers as they appear inside XML character data
    ///
    /// Quotes are left alone: writers only escape them inside attribute values.
    pub fn xml_escaped(&self) -> Self {
        Self {
            start: quick_xml::escape::partial_escape(self.start.as_str()).into_owned(),
            end: quick_xml::escape::partial_escape(self.end.as_str()).into_owned(),
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            start: DEFAULT_START.to_string(),
            end: DEFAULT_END.to_string(),
        }
    }
}

/// A placeholder occurrence in scanned text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Exact source text from the start marker through the end marker
    pub raw: String,
    /// Text between the markers, trimmed
    pub text: String,
    /// Byte offset of the start marker
    pub start: usize,
    /// Byte offset just past the end marker
    pub end: usize,
    /// Resolution mode decided by the tag prefix
    pub tag: Tag,
}

/// Result of a lenient scan: every token found plus every error met
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub tokens: Vec<Token>,
    pub errors: Vec<ScanError>,
}

/// Finds non-overlapping, leftmost-first tokens in text
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    delimiters: Delimiters,
}

impl Scanner {
    pub fn new(delimiters: Delimiters) -> Self {
        Self { delimiters }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Scan text, failing on the first malformed token
    pub fn scan(&self, text: &str) -> Result<Vec<Token>, ScanError> {
        let outcome = self.scan_lenient(text);
        match outcome.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(outcome.tokens),
        }
    }

    /// Scan text, collecting errors instead of stopping at the first one.
    ///
    /// A nested start marker abandons the open token and scanning resumes at
    /// the nested marker. An unterminated token ends the scan.
    pub fn scan_lenient(&self, text: &str) -> ScanOutcome {
        let start_marker = self.delimiters.start.as_str();
        let end_marker = self.delimiters.end.as_str();
        let mut outcome = ScanOutcome::default();
        let mut pos = 0;

        while let Some(found) = text[pos..].find(start_marker) {
            let start = pos + found;
            let body_start = start + start_marker.len();

            let Some(close) = text[body_start..].find(end_marker) else {
                outcome.errors.push(ScanError::UnterminatedToken { offset: start });
                break;
            };
            let body_end = body_start + close;

            if let Some(nested) = text[body_start..body_end].find(start_marker) {
                let nested_at = body_start + nested;
                outcome.errors.push(ScanError::NestedToken { offset: start, nested_at });
                pos = nested_at;
                continue;
            }

            let end = body_end + end_marker.len();
            let inner = text[body_start..body_end].trim();
            outcome.tokens.push(Token {
                raw: text[start..end].to_string(),
                text: inner.to_string(),
                start,
                end,
                tag: Tag::classify(inner),
            });
            pos = end;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::FieldPath;

    fn scanner() -> Scanner {
        Scanner::default()
    }

    #[test]
    fn test_scan_single_token() {
        let tokens = scanner().scan("Hello [[name]]!").unwrap();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].raw, "[[name]]");
        assert_eq!(tokens[0].text, "name");
        assert_eq!((tokens[0].start, tokens[0].end), (6, 14));
        assert_eq!(tokens[0].tag, Tag::FieldLookup(FieldPath::parse("name")));
    }

    #[test]
    fn test_scan_trims_tag_text() {
        let tokens = scanner().scan("[[  client.name \n]]").unwrap();
        assert_eq!(tokens[0].text, "client.name");
    }

    #[test]
    fn test_scan_multiple_tokens_in_order() {
        let tokens = scanner().scan("[[a]] and [[@b]] then [[c]]").unwrap();

        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "@b", "c"]);
        assert_eq!(tokens[1].tag, Tag::RawMarkup("b".to_string()));
    }

    #[test]
    fn test_scan_no_tokens() {
        assert!(scanner().scan("plain text ] ]] [ only").unwrap().is_empty());
    }

    #[test]
    fn test_scan_unterminated() {
        let err = scanner().scan("ok [[a]] broken [[b").unwrap_err();
        assert_eq!(err, ScanError::UnterminatedToken { offset: 16 });
    }

    #[test]
    fn test_scan_nested() {
        let err = scanner().scan("[[a [[b]] c]]").unwrap_err();
        assert_eq!(err, ScanError::NestedToken { offset: 0, nested_at: 4 });
    }

    #[test]
    fn test_scan_lenient_keeps_going_after_nested() {
        let outcome = scanner().scan_lenient("[[a [[b]] [[c]] [[d");

        let texts: Vec<&str> = outcome.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
        assert_eq!(
            outcome.errors,
            vec![
                ScanError::NestedToken { offset: 0, nested_at: 4 },
                ScanError::UnterminatedToken { offset: 16 },
            ]
        );
    }

    #[test]
    fn test_scan_custom_delimiters() {
        let scanner = Scanner::new(Delimiters::new("{%", "%}").unwrap());
        let tokens = scanner.scan("Dear {% name %}, [[ignored]]").unwrap();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "name");
    }

    #[test]
    fn test_scan_identical_markers() {
        let scanner = Scanner::new(Delimiters::new("%%", "%%").unwrap());
        let tokens = scanner.scan("%%a%% and %%b%%").unwrap();

        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_scan_multibyte_text() {
        let tokens = scanner().scan("Città: [[città]] ☒").unwrap();
        assert_eq!(tokens[0].text, "città");
        assert_eq!(&"Città: [[città]] ☒"[tokens[0].start..tokens[0].end], "[[città]]");
    }

    #[test]
    fn test_empty_delimiters_rejected() {
        assert!(Delimiters::new("", "]]").is_none());
        assert!(Delimiters::new("[[", "").is_none());
    }

    #[test]
    fn test_xml_escaped_delimiters() {
        let escaped = Delimiters::new("<<", ">>").unwrap().xml_escaped();
        assert_eq!(escaped.start(), "&lt;&lt;");
        assert_eq!(escaped.end(), "&gt;&gt;");
    }

    #[test]
    fn test_xml_escaped_quote_delimiters() {
        let escaped = Delimiters::new("'", "\"").unwrap().xml_escaped();
        assert_eq!(escaped.start(), "'");
        assert_eq!(escaped.end(), "\"");
    }
}
