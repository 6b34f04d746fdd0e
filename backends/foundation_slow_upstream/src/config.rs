use core::fmt;
use std::net::SocketAddr;

/// Port the fixture listens on when none is given.
pub const DEFAULT_PORT: u16 = 8081;

/// The fixture always binds every interface.
pub const BIND_ADDRESS: &str = "0.0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
}

// -- Constructors

impl ServiceConfig {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Socket address to bind: all interfaces on the configured port.
    #[must_use]
    pub fn socket_addr(self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

// -- Debug Display

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", BIND_ADDRESS, self.port)
    }
}
