//! Archive data structures

use crate::decoder::Decoder;
use crate::encoder::{CompressionPolicy, Encoder};
use crate::error::DocgenError;

/// Main body part of a WordprocessingML package
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// Content types manifest present in every OOXML package
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Represents a single entry in an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full entry name inside the container (forward slashes)
    pub name: String,
    /// Decompressed contents
    pub data: Vec<u8>,
    /// Whether this entry is a directory record
    pub is_dir: bool,
    /// Unix permission bits carried by the source archive
    pub unix_mode: Option<u32>,
}

impl Entry {
    /// Create a new file entry with the given name and data
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            is_dir: false,
            unix_mode: None,
        }
    }

    /// Create a directory entry
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
            is_dir: true,
            unix_mode: None,
        }
    }

    /// Whether the entry is an XML part (by extension)
    pub fn is_xml(&self) -> bool {
        !self.is_dir && (self.name.ends_with(".xml") || self.name.ends_with(".rels"))
    }
}

/// In-memory container: an ordered set of uniquely named entries.
///
/// The archive produced by [`Decoder`] is never mutated by rendering;
/// the render engine works on a copy and only commits when every tag resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: Vec<Entry>,
}

impl Archive {
    /// Create a new empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a zip container with the default [`Decoder`] settings
    pub fn open(bytes: &[u8]) -> Result<Self, DocgenError> {
        Decoder::new().decode(bytes)
    }

    /// Serialize into a new zip container
    pub fn serialize(&self, compression: CompressionPolicy) -> Result<Vec<u8>, DocgenError> {
        Encoder::new().with_compression(compression).encode(self)
    }

    /// Add an entry to the archive
    /// Returns an error if an entry with the same name already exists
    pub fn add_entry(&mut self, entry: Entry) -> Result<(), DocgenError> {
        if self.contains(&entry.name) {
            return Err(DocgenError::CorruptArchive {
                reason: format!("duplicate entry: {}", entry.name),
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Read the contents of a named entry
    pub fn read_entry(&self, name: &str) -> Result<&[u8], DocgenError> {
        self.find(name)
            .map(|entry| entry.data.as_slice())
            .ok_or_else(|| DocgenError::EntryNotFound { name: name.to_string() })
    }

    /// Replace the contents of an existing entry, keeping its attributes
    pub fn write_entry(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<(), DocgenError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| DocgenError::EntryNotFound { name: name.to_string() })?;
        entry.data = data.into();
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Look up an entry by name
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entry names in archive order
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
