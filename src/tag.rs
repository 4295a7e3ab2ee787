//! Tag classification and resolution against the data tree

use std::fmt;

use serde_json::{Number, Value};

use crate::error::ResolveError;

/// Prefix selecting raw-markup mode
pub const RAW_MARKUP_SENTINEL: char = '@';
/// Prefix opening a repeat scope
pub const LOOP_OPEN_SENTINEL: char = '#';
/// Prefix closing a repeat scope
pub const LOOP_CLOSE_SENTINEL: char = '/';

/// A dotted path into the data tree.
///
/// `.` (or an empty path) designates the current scope value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(text: &str) -> Self {
        let segments = text
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the path designates the current scope itself
    pub fn is_current(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str(".")
        } else {
            f.write_str(&self.segments.join("."))
        }
    }
}

/// Classified tag text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// Escaped substitution of a scalar value
    FieldLookup(FieldPath),
    /// Verbatim insertion of a pre-built markup string
    RawMarkup(String),
    /// Start of a repeat scope over a sequence
    LoopOpen(FieldPath),
    /// End of a repeat scope
    LoopClose(FieldPath),
}

impl Tag {
    /// Classify trimmed tag text by its prefix sentinel
    pub fn classify(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix(RAW_MARKUP_SENTINEL) {
            Tag::RawMarkup(rest.trim().to_string())
        } else if let Some(rest) = text.strip_prefix(LOOP_OPEN_SENTINEL) {
            Tag::LoopOpen(FieldPath::parse(rest))
        } else if let Some(rest) = text.strip_prefix(LOOP_CLOSE_SENTINEL) {
            Tag::LoopClose(FieldPath::parse(rest))
        } else {
            Tag::FieldLookup(FieldPath::parse(text))
        }
    }
}

/// What a missing (absent or JSON `null`) value renders as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NullPolicy {
    /// Render the empty string
    #[default]
    EmptyString,
    /// Leave the token text in the document untouched
    Omit,
    /// Record a `MissingField` error
    Fail,
}

/// Outcome of resolving a substitution tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    /// Plain text, to be escaped by the caller
    Text(String),
    /// Markup inserted without escaping
    Markup(String),
    /// Missing value under `NullPolicy::Omit`: keep the token as written
    Omitted,
}

/// Chain of lookup scopes, innermost last.
///
/// The root is the whole data tree; each repeat scope pushes the current
/// sequence element.
#[derive(Debug, Clone)]
pub struct Scopes<'v> {
    stack: Vec<&'v Value>,
}

impl<'v> Scopes<'v> {
    pub fn new(root: &'v Value) -> Self {
        Self { stack: vec![root] }
    }

    pub fn push(&mut self, value: &'v Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Find the value at `path`.
    ///
    /// The first segment picks the innermost scope that has it; the rest
    /// descend from there. Numeric segments index sequences.
    pub fn lookup(&self, path: &FieldPath) -> Option<&'v Value> {
        let innermost = *self.stack.last()?;
        let Some((first, rest)) = path.segments().split_first() else {
            return Some(innermost);
        };

        let base = self
            .stack
            .iter()
            .rev()
            .find_map(|scope| child(*scope, first))?;

        rest.iter().try_fold(base, |value, segment| child(value, segment))
    }
}

fn child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Largest magnitude up to which every integer is exact in an `f64` (2^53)
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Canonical text of a number: integral floats print without a fraction
fn format_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

/// Human-readable JSON type name for error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Resolves tags against a scope chain under a null policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    null_policy: NullPolicy,
}

impl Resolver {
    pub fn new(null_policy: NullPolicy) -> Self {
        Self { null_policy }
    }

    pub fn null_policy(&self) -> NullPolicy {
        self.null_policy
    }

    /// Resolve a field-lookup path to text
    pub fn resolve_field(
        &self,
        path: &FieldPath,
        scopes: &Scopes<'_>,
    ) -> Result<ResolvedValue, ResolveError> {
        match scopes.lookup(path) {
            None | Some(Value::Null) => {
                self.missing(path.to_string(), ResolvedValue::Text(String::new()))
            }
            Some(Value::String(s)) => Ok(ResolvedValue::Text(s.clone())),
            Some(Value::Number(n)) => Ok(ResolvedValue::Text(format_number(n))),
            Some(Value::Bool(b)) => Ok(ResolvedValue::Text(b.to_string())),
            Some(other) => Err(ResolveError::InvalidFieldType {
                path: path.to_string(),
                found: type_name(other),
            }),
        }
    }

    /// Resolve a raw-markup field; only string values are accepted
    pub fn resolve_markup(
        &self,
        name: &str,
        scopes: &Scopes<'_>,
    ) -> Result<ResolvedValue, ResolveError> {
        let path = FieldPath::parse(name);
        match scopes.lookup(&path) {
            None | Some(Value::Null) => {
                self.missing(name.to_string(), ResolvedValue::Markup(String::new()))
            }
            Some(Value::String(s)) => Ok(ResolvedValue::Markup(s.clone())),
            Some(other) => Err(ResolveError::InvalidFieldType {
                path: name.to_string(),
                found: type_name(other),
            }),
        }
    }

    /// Resolve a repeat scope to its elements, in sequence order.
    ///
    /// A missing value yields no elements unless the policy is `Fail`.
    pub fn resolve_sequence<'v>(
        &self,
        path: &FieldPath,
        scopes: &Scopes<'v>,
    ) -> Result<&'v [Value], ResolveError> {
        match scopes.lookup(path) {
            None | Some(Value::Null) => match self.null_policy {
                NullPolicy::Fail => Err(ResolveError::MissingField { path: path.to_string() }),
                NullPolicy::EmptyString | NullPolicy::Omit => Ok(&[]),
            },
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(other) => Err(ResolveError::InvalidFieldType {
                path: path.to_string(),
                found: type_name(other),
            }),
        }
    }

    fn missing(&self, path: String, empty: ResolvedValue) -> Result<ResolvedValue, ResolveError> {
        match self.null_policy {
            NullPolicy::EmptyString => Ok(empty),
            NullPolicy::Omit => Ok(ResolvedValue::Omitted),
            NullPolicy::Fail => Err(ResolveError::MissingField { path }),
        }
    }
}
