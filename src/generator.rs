//! End-to-end document generation: decode, transform, render, encode

use tracing::debug;

use crate::decoder::{Decoder, DEFAULT_SIZE_LIMIT};
use crate::encoder::{CompressionPolicy, Encoder};
use crate::error::DocgenError;
use crate::render::{RenderOptions, Renderer};
use crate::transform::{self, DataTree, TransformPolicy};

/// Stateless document generator.
///
/// Holds only configuration, so one instance can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct Generator {
    renderer: Renderer,
    transform: TransformPolicy,
    compression: CompressionPolicy,
    size_limit: u64,
}

impl Generator {
    pub fn new() -> Self {
        Self {
            renderer: Renderer::new(RenderOptions::default()),
            transform: TransformPolicy::default(),
            compression: CompressionPolicy::default(),
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }

    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.renderer = Renderer::new(options);
        self
    }

    pub fn with_transform(mut self, policy: TransformPolicy) -> Self {
        self.transform = policy;
        self
    }

    pub fn with_compression(mut self, compression: CompressionPolicy) -> Self {
        self.compression = compression;
        self
    }

    /// Cap on the total decompressed size of a template
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    pub fn render_options(&self) -> &RenderOptions {
        self.renderer.options()
    }

    /// Render a template container with the given data tree.
    ///
    /// Returns the bytes of a new container; nothing is produced when any
    /// tag fails.
    pub fn generate(&self, template: &[u8], data: DataTree) -> Result<Vec<u8>, DocgenError> {
        let archive = Decoder::new().with_size_limit(self.size_limit).decode(template)?;
        debug!(entries = archive.len(), bytes = template.len(), "decoded template");

        let data = transform::transform(data, &self.transform);
        let rendered = self.renderer.render(&archive, &data)?;

        let output = Encoder::new().with_compression(self.compression).encode(&rendered)?;
        debug!(bytes = output.len(), "encoded document");
        Ok(output)
    }

    /// Same as [`Generator::generate`], taking the data as JSON text
    pub fn generate_from_json(
        &self,
        template: &[u8],
        payload: &str,
    ) -> Result<Vec<u8>, DocgenError> {
        let data = transform::parse_payload(payload)?;
        self.generate(template, data)
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}
