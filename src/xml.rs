//! Lossless lexing of Office XML parts
//!
//! A part is split into [`Piece`]s whose raw slices concatenate back to the
//! exact source text, so untouched markup survives rendering byte for byte.

use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::Reader;

const BOM: char = '\u{feff}';

/// Attribute added to text elements whose content is rewritten
pub const PRESERVE_SPACE: &str = r#"xml:space="preserve""#;

/// Element vocabulary of a template-bearing part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    /// Elements whose character data is scanned for tokens
    pub text_elements: &'static [&'static str],
    /// Run element wrapping text elements, split around raw markup
    pub run: Option<&'static str>,
    /// Formatting element copied when a run is split
    pub run_properties: Option<&'static str>,
    /// Structural block repeated by paragraph loops
    pub paragraph: Option<&'static str>,
    /// Markup inserted for a newline inside a text element
    pub line_break: Option<&'static str>,
    /// Whether all text elements of a part form one scanned stream.
    /// When false each element is scanned on its own.
    pub single_stream: bool,
    /// Whether rewritten text elements get `xml:space="preserve"`
    pub preserve_space: bool,
}

impl Grammar {
    pub fn is_text_element(&self, name: &str) -> bool {
        self.text_elements.contains(&name)
    }
}

/// WordprocessingML body, header, footer and note parts
pub const WORDPROCESSING: Grammar = Grammar {
    text_elements: &["w:t"],
    run: Some("w:r"),
    run_properties: Some("w:rPr"),
    paragraph: Some("w:p"),
    line_break: Some("<w:br/>"),
    single_stream: true,
    preserve_space: true,
};

/// Core and extended document properties
pub const DOC_PROPERTIES: Grammar = Grammar {
    text_elements: &[
        "dc:title",
        "dc:subject",
        "dc:creator",
        "dc:description",
        "cp:keywords",
        "cp:category",
        "cp:lastModifiedBy",
        "Company",
        "Manager",
    ],
    run: None,
    run_properties: None,
    paragraph: None,
    line_break: None,
    single_stream: false,
    preserve_space: false,
};

/// Grammar for a template-bearing entry, `None` for entries copied verbatim
pub fn grammar_for(entry: &str) -> Option<&'static Grammar> {
    match entry {
        "word/document.xml" | "word/footnotes.xml" | "word/endnotes.xml" | "word/comments.xml" => {
            Some(&WORDPROCESSING)
        }
        "docProps/core.xml" | "docProps/app.xml" => Some(&DOC_PROPERTIES),
        _ if is_numbered_part(entry, "word/header") || is_numbered_part(entry, "word/footer") => {
            Some(&WORDPROCESSING)
        }
        _ => None,
    }
}

/// Matches `<prefix><digits>.xml`
fn is_numbered_part(entry: &str, prefix: &str) -> bool {
    entry
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(".xml"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// A lexical unit of an XML part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece<'a> {
    Open { name: &'a str, raw: &'a str },
    Close { name: &'a str, raw: &'a str },
    /// Self-closing element, declaration, comment, CDATA or processing instruction
    Other { raw: &'a str },
    /// Character data; `text_node` marks content of a grammar text element
    Text { raw: &'a str, text_node: bool },
}

impl<'a> Piece<'a> {
    pub fn raw(&self) -> &'a str {
        match self {
            Piece::Open { raw, .. }
            | Piece::Close { raw, .. }
            | Piece::Other { raw }
            | Piece::Text { raw, .. } => *raw,
        }
    }
}

/// Split an XML part into pieces, checking well-formedness
pub fn lex<'a>(xml: &'a str, grammar: &Grammar) -> Result<Vec<Piece<'a>>, String> {
    let mut pieces = Vec::new();
    // The reader skips a byte order mark without counting it in positions.
    let xml = match xml.strip_prefix(BOM) {
        Some(rest) => {
            pieces.push(Piece::Other { raw: &xml[..BOM.len_utf8()] });
            rest
        }
        None => xml,
    };

    let mut reader = Reader::from_str(xml);
    let mut last = 0;
    let mut text_depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| e.to_string())?;
        let end = reader.buffer_position() as usize;
        let raw = &xml[last..end];

        match event {
            Event::Eof => break,
            Event::Start(_) => {
                let name = element_name(raw);
                if grammar.is_text_element(name) {
                    text_depth += 1;
                }
                pieces.push(Piece::Open { name, raw });
            }
            Event::End(_) => {
                let name = element_name(raw);
                if grammar.is_text_element(name) {
                    text_depth = text_depth.saturating_sub(1);
                }
                pieces.push(Piece::Close { name, raw });
            }
            Event::Text(_) => pieces.push(Piece::Text { raw, text_node: text_depth > 0 }),
            _ => pieces.push(Piece::Other { raw }),
        }
        last = end;
    }

    if last < xml.len() {
        pieces.push(Piece::Other { raw: &xml[last..] });
    }
    Ok(pieces)
}

/// Qualified element name of a start or end tag
pub fn element_name(raw: &str) -> &str {
    let tag = match raw.find('<') {
        Some(i) => &raw[i + 1..],
        None => raw,
    };
    let tag = tag.strip_prefix('/').unwrap_or(tag);
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(tag.len());
    &tag[..end]
}

/// Add `xml:space="preserve"` to a start tag that lacks an `xml:space` attribute
pub fn preserve_space(raw: &str) -> Cow<'_, str> {
    if raw.contains("xml:space") {
        return Cow::Borrowed(raw);
    }
    match raw.strip_suffix('>') {
        Some(head) => Cow::Owned(format!("{} {}>", head.trim_end(), PRESERVE_SPACE)),
        None => Cow::Borrowed(raw),
    }
}
