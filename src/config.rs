//! Service configuration, resolved once at startup

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::generator::Generator;

pub const DEFAULT_PORT: u16 = 8080;

/// Largest accepted template upload
pub const DEFAULT_UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

/// Settings shared read-only by every request handler
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Maximum size of the `template` part, in bytes
    pub upload_limit: usize,
    pub generator: Generator,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            generator: Generator::new(),
        }
    }

    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_upload_limit(mut self, limit: usize) -> Self {
        self.upload_limit = limit;
        self
    }

    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = generator;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Cap on a whole request body: the template plus room for the data
    /// field and multipart framing
    pub fn body_limit(&self) -> usize {
        self.upload_limit.saturating_mul(2)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
