//! Pre-render data transformation
//!
//! Boolean fields are turned into render-ready siblings before the tree
//! reaches the resolver:
//!
//! - glyph fields: `<name>_checkbox` holding a ballot box character
//! - markup fields: `<name>_xml` holding a WordprocessingML checkbox run,
//!   meant for a raw-markup tag such as `[[@accepted_xml]]`
//!
//! Original fields are always kept.

use serde_json::{Map, Value};

use crate::error::DocgenError;

/// The structured payload handed to the renderer
pub type DataTree = Map<String, Value>;

/// Suffix of glyph fields
pub const GLYPH_SUFFIX: &str = "_checkbox";
/// Suffix of markup fields
pub const MARKUP_SUFFIX: &str = "_xml";

/// Logical state of a checkbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Checked,
    Unchecked,
}

impl From<bool> for CheckState {
    fn from(value: bool) -> Self {
        if value {
            CheckState::Checked
        } else {
            CheckState::Unchecked
        }
    }
}

/// Ballot box glyphs
pub struct CheckboxGlyph;

impl CheckboxGlyph {
    pub const CHECKED: &'static str = "\u{2612}";
    pub const UNCHECKED: &'static str = "\u{2610}";

    pub fn for_state(state: CheckState) -> &'static str {
        match state {
            CheckState::Checked => Self::CHECKED,
            CheckState::Unchecked => Self::UNCHECKED,
        }
    }
}

/// Revision of the markup fragments below; bump on any change to them
pub const CHECKBOX_MARKUP_VERSION: u32 = 1;

/// Self-contained WordprocessingML runs drawing a checkbox.
///
/// Each fragment is one complete `w:r` element, valid anywhere a run is.
pub struct CheckboxMarkup;

impl CheckboxMarkup {
    pub const CHECKED: &'static str = concat!(
        r#"<w:r><w:rPr><w:rFonts w:ascii="Wingdings" w:hAnsi="Wingdings"/></w:rPr>"#,
        r#"<w:sym w:font="Wingdings" w:char="F0FE"/></w:r>"#,
    );
    pub const UNCHECKED: &'static str = concat!(
        r#"<w:r><w:rPr><w:rFonts w:ascii="Wingdings" w:hAnsi="Wingdings"/></w:rPr>"#,
        r#"<w:sym w:font="Wingdings" w:char="F0A8"/></w:r>"#,
    );

    pub fn for_state(state: CheckState) -> &'static str {
        match state {
            CheckState::Checked => Self::CHECKED,
            CheckState::Unchecked => Self::UNCHECKED,
        }
    }
}

/// Which boolean fields get derived siblings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformPolicy {
    /// Add `<name>_checkbox` for every boolean field in scope
    pub glyphs: bool,
    /// Boolean fields that also get a `<name>_xml` markup sibling
    pub markup_fields: Vec<String>,
    /// Dotted paths to nested mappings (or sequences of mappings) that are
    /// transformed too; the top level is always transformed
    pub nested_paths: Vec<String>,
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self {
            glyphs: true,
            markup_fields: Vec::new(),
            nested_paths: Vec::new(),
        }
    }
}

impl TransformPolicy {
    /// Policy that derives nothing
    pub fn none() -> Self {
        Self {
            glyphs: false,
            ..Self::default()
        }
    }

    pub fn with_markup_field(mut self, field: impl Into<String>) -> Self {
        self.markup_fields.push(field.into());
        self
    }

    pub fn with_nested_path(mut self, path: impl Into<String>) -> Self {
        self.nested_paths.push(path.into());
        self
    }
}

/// Parse the raw request payload into a data tree
pub fn parse_payload(payload: &str) -> Result<DataTree, DocgenError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| DocgenError::InvalidInputPayload {
        reason: e.to_string(),
    })?;
    into_tree(value)
}

/// Require a JSON value to be a mapping
pub fn into_tree(value: Value) -> Result<DataTree, DocgenError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DocgenError::InvalidInputPayload {
            reason: format!("expected a JSON object, got {}", crate::tag::type_name(&other)),
        }),
    }
}

/// Derive render-ready fields from boolean inputs
pub fn transform(mut tree: DataTree, policy: &TransformPolicy) -> DataTree {
    transform_mapping(&mut tree, policy);

    for path in &policy.nested_paths {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if let Some((first, rest)) = segments.split_first() {
            if let Some(value) = tree.get_mut(*first) {
                transform_at(value, rest, policy);
            }
        }
    }

    tree
}

fn transform_at(value: &mut Value, rest: &[&str], policy: &TransformPolicy) {
    match value {
        Value::Array(items) => {
            for item in items {
                transform_at(item, rest, policy);
            }
        }
        Value::Object(map) => match rest.split_first() {
            None => transform_mapping(map, policy),
            Some((next, rest)) => {
                if let Some(child) = map.get_mut(*next) {
                    transform_at(child, rest, policy);
                }
            }
        },
        _ => {}
    }
}

fn transform_mapping(map: &mut DataTree, policy: &TransformPolicy) {
    let booleans: Vec<(String, bool)> = map
        .iter()
        .filter_map(|(key, value)| value.as_bool().map(|b| (key.clone(), b)))
        .collect();

    for (key, flag) in booleans {
        let state = CheckState::from(flag);
        if policy.glyphs {
            map.insert(
                format!("{key}{GLYPH_SUFFIX}"),
                Value::String(CheckboxGlyph::for_state(state).to_string()),
            );
        }
        if policy.markup_fields.iter().any(|f| f == &key) {
            map.insert(
                format!("{key}{MARKUP_SUFFIX}"),
                Value::String(CheckboxMarkup::for_state(state).to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> DataTree {
        into_tree(value).unwrap()
    }

    #[test]
    fn test_glyph_fields() {
        let data = tree(json!({"yes": true, "no": false, "name": "x"}));
        let out = transform(data, &TransformPolicy::default());

        assert_eq!(out["yes_checkbox"], json!("☒"));
        assert_eq!(out["no_checkbox"], json!("☐"));
        assert_eq!(out["yes"], json!(true));
        assert_eq!(out["no"], json!(false));
        assert!(!out.contains_key("name_checkbox"));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_glyph_overwrites_existing_key() {
        let out = transform(
            tree(json!({"ok": true, "ok_checkbox": "stale"})),
            &TransformPolicy::default(),
        );
        assert_eq!(out["ok_checkbox"], json!("☒"));
    }

    #[test]
    fn test_markup_fields() {
        let policy = TransformPolicy::default().with_markup_field("accepted");
        let out = transform(tree(json!({"accepted": true, "other": false})), &policy);

        assert_eq!(out["accepted_xml"], json!(CheckboxMarkup::CHECKED));
        assert!(!out.contains_key("other_xml"));
        assert_eq!(out["other_checkbox"], json!("☐"));
    }

    #[test]
    fn test_markup_only_policy() {
        let policy = TransformPolicy::none().with_markup_field("flag");
        let out = transform(tree(json!({"flag": false})), &policy);

        assert_eq!(out["flag_xml"], json!(CheckboxMarkup::UNCHECKED));
        assert!(!out.contains_key("flag_checkbox"));
    }

    #[test]
    fn test_nested_paths() {
        let policy = TransformPolicy::default()
            .with_nested_path("items")
            .with_nested_path("meta.flags");
        let out = transform(
            tree(json!({
                "items": [{"done": true}, {"done": false}],
                "meta": {"flags": {"urgent": true}},
                "other": {"ignored": true}
            })),
            &policy,
        );

        assert_eq!(out["items"][0]["done_checkbox"], json!("☒"));
        assert_eq!(out["items"][1]["done_checkbox"], json!("☐"));
        assert_eq!(out["meta"]["flags"]["urgent_checkbox"], json!("☒"));
        assert!(out["other"].get("ignored_checkbox").is_none());
    }

    #[test]
    fn test_markup_fragments_are_balanced_runs() {
        for fragment in [CheckboxMarkup::CHECKED, CheckboxMarkup::UNCHECKED] {
            assert!(fragment.starts_with("<w:r>") && fragment.ends_with("</w:r>"));
            let mut reader = quick_xml::Reader::from_str(fragment);
            while !matches!(reader.read_event().unwrap(), quick_xml::events::Event::Eof) {}
        }
    }

    #[test]
    fn test_parse_payload() {
        let parsed = parse_payload(r#"{"name": "World"}"#).unwrap();
        assert_eq!(parsed["name"], json!("World"));
    }

    #[test]
    fn test_parse_payload_rejects_non_json() {
        let err = parse_payload("not-json").unwrap_err();
        assert!(matches!(err, DocgenError::InvalidInputPayload { .. }));
    }

    #[test]
    fn test_parse_payload_rejects_non_object() {
        let err = parse_payload("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("expected a JSON object, got sequence"));
    }
}
