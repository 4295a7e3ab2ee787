//! # emx-docgen
//!
//! DOCX template rendering: placeholder substitution over Office Open XML
//! packages.
//!
//! A template is an ordinary `.docx` whose text carries delimited tokens:
//!
//! ```text
//! Dear [[client.name]],
//! [[#items]]
//! [[name]]  x [[qty]]
//! [[/items]]
//! Signed: [[@signature]]
//! ```
//!
//! ## Tags
//!
//! - `[[path]]`: field lookup, the value is XML-escaped
//! - `[[@name]]`: raw markup, the value is inserted verbatim
//! - `[[#path]]` / `[[/path]]`: repeat scope over a sequence
//!
//! ## Pipeline
//!
//! 1. [`Decoder`] opens the zip container into an [`Archive`]
//! 2. [`transform`] derives glyph (`<name>_checkbox`) and markup
//!    (`<name>_xml`) fields from booleans
//! 3. [`Renderer`] substitutes tokens in every template-bearing part,
//!    collecting all tag failures into one [`DocgenError::RenderFailed`]
//! 4. [`Encoder`] writes a new container
//!
//! [`Generator`] runs the whole pipeline. With the `server` feature,
//! [`server`] exposes it over HTTP.

pub mod archive;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod generator;
pub mod render;
pub mod scanner;
#[cfg(feature = "server")]
pub mod server;
pub mod tag;
pub mod transform;
pub mod xml;

#[cfg(test)]
mod fixtures;

pub use archive::{Archive, Entry, CONTENT_TYPES_PART, MAIN_DOCUMENT_PART};
pub use config::ServerConfig;
pub use decoder::Decoder;
pub use encoder::{CompressionPolicy, Encoder};
pub use error::{
    DocgenError, RenderErrorEntry, RenderErrors, ResolveError, ScanError, TagError,
};
pub use generator::Generator;
pub use render::{RenderOptions, Renderer};
pub use scanner::{Delimiters, Scanner, Token};
pub use tag::{FieldPath, NullPolicy, Resolver, Tag};
pub use transform::{CheckState, CheckboxGlyph, CheckboxMarkup, DataTree, TransformPolicy};
