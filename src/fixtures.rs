//! Minimal DOCX packages for unit tests

use crate::archive::{Archive, Entry, CONTENT_TYPES_PART, MAIN_DOCUMENT_PART};
use crate::encoder::Encoder;

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

pub const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Wrap body markup in a `w:document` part
pub fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

/// A paragraph holding one plain run
pub fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
}

pub fn docx(document: &str) -> Archive {
    let mut archive = Archive::new();
    archive.add_entry(Entry::new(CONTENT_TYPES_PART, CONTENT_TYPES)).unwrap();
    archive.add_entry(Entry::directory("_rels/")).unwrap();
    archive.add_entry(Entry::new("_rels/.rels", ROOT_RELS)).unwrap();
    archive.add_entry(Entry::new(MAIN_DOCUMENT_PART, document)).unwrap();
    archive
}

pub fn docx_bytes(document: &str) -> Vec<u8> {
    Encoder::new().encode(&docx(document)).unwrap()
}
