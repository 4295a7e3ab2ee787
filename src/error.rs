//! Error types for the rendering pipeline

use std::fmt;

use thiserror::Error;

/// Top-level error for every pipeline stage.
///
/// Archive-structural variants abort immediately. Per-tag problems are
/// collected by the render engine and surface together as
/// [`DocgenError::RenderFailed`].
#[derive(Debug, Error)]
pub enum DocgenError {
    /// The byte buffer is not a readable zip container
    #[error("corrupt archive: {reason}")]
    CorruptArchive { reason: String },

    /// A named entry does not exist in the archive
    #[error("entry not found in archive: {name}")]
    EntryNotFound { name: String },

    /// A template-bearing entry is not well-formed XML
    #[error("malformed XML in {entry}: {reason}")]
    MalformedXml { entry: String, reason: String },

    /// The data payload is not a JSON object
    #[error("invalid input payload: {reason}")]
    InvalidInputPayload { reason: String },

    /// One or more tags failed to render
    #[error("{0}")]
    RenderFailed(RenderErrors),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The zip writer rejected an entry
    #[error("failed to write archive: {0}")]
    ArchiveWrite(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while scanning text for delimited tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// A start marker with no end marker after it
    #[error("unterminated token starting at offset {offset}")]
    UnterminatedToken { offset: usize },

    /// A start marker found inside an open token
    #[error("nested token at offset {nested_at} inside token starting at offset {offset}")]
    NestedToken { offset: usize, nested_at: usize },
}

/// Errors raised while resolving a tag against the data tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The value at `path` has a type the tag cannot render
    #[error("field '{path}' has type {found}, which cannot be rendered here")]
    InvalidFieldType { path: String, found: &'static str },

    /// The value at `path` is absent and the null policy is `Fail`
    #[error("field '{path}' is missing")]
    MissingField { path: String },
}

/// Underlying cause recorded in a [`RenderErrorEntry`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A loop opening tag without its closing tag
    #[error("repeat scope is never closed")]
    UnclosedLoop,

    /// A loop closing tag without an opening tag
    #[error("closing tag has no matching opening tag")]
    UnopenedLoop,

    /// A loop closing tag for a different path than the open one
    #[error("closing tag does not match open repeat scope '{expected}'")]
    MismatchedLoop { expected: String },

    /// The markup between the loop tags cannot be repeated as a unit
    #[error("repeat scope tags are not at the same level of the document structure")]
    UnbalancedLoop,
}

/// A single tag failure, located by entry name and text offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderErrorEntry {
    /// Archive entry the tag lives in
    pub entry: String,
    /// Tag text as written in the template (without delimiters)
    pub tag: String,
    /// Byte offset of the token in the scanned text stream
    pub offset: usize,
    pub cause: TagError,
}

impl fmt::Display for RenderErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} [{}]: {}", self.entry, self.offset, self.tag, self.cause)
    }
}

/// Non-empty collection of render failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderErrors(Vec<RenderErrorEntry>);

impl RenderErrors {
    /// Wrap a list of entries, `None` when the list is empty
    pub fn new(entries: Vec<RenderErrorEntry>) -> Option<Self> {
        if entries.is_empty() {
            None
        } else {
            Some(Self(entries))
        }
    }

    pub fn entries(&self) -> &[RenderErrorEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false, the list is non-empty by construction
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_entries(self) -> Vec<RenderErrorEntry> {
        self.0
    }
}

impl fmt::Display for RenderErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = &self.0[0];
        match self.0.len() {
            1 => write!(f, "render failed: {first}"),
            n => write!(f, "render failed with {n} errors, first: {first}"),
        }
    }
}

impl DocgenError {
    /// Detail list for aggregated render failures, empty for every other variant
    pub fn render_errors(&self) -> &[RenderErrorEntry] {
        match self {
            DocgenError::RenderFailed(errors) => errors.entries(),
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: &str, cause: TagError) -> RenderErrorEntry {
        RenderErrorEntry {
            entry: "word/document.xml".to_string(),
            tag: tag.to_string(),
            offset: 4,
            cause,
        }
    }

    #[test]
    fn test_render_errors_rejects_empty() {
        assert!(RenderErrors::new(Vec::new()).is_none());
    }

    #[test]
    fn test_render_failed_message_counts_entries() {
        let errors = RenderErrors::new(vec![
            entry("a", TagError::UnclosedLoop),
            entry("b", TagError::UnopenedLoop),
        ])
        .unwrap();
        let err = DocgenError::RenderFailed(errors);

        let message = err.to_string();
        assert!(message.contains("2 errors"));
        assert!(message.contains("word/document.xml@4 [a]"));
        assert_eq!(err.render_errors().len(), 2);
    }

    #[test]
    fn test_single_error_message() {
        let errors = RenderErrors::new(vec![entry(
            "name",
            TagError::Resolve(ResolveError::MissingField { path: "name".to_string() }),
        )])
        .unwrap();
        assert_eq!(
            errors.to_string(),
            "render failed: word/document.xml@4 [name]: field 'name' is missing"
        );
    }
}
