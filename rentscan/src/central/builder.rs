// rentscan/src/central/builder.rs

use crate::central::{Central, Disabled};
use crate::config::CentralConfig;
use crate::transport::Transport;
use crate::utils::{Clock, SystemClock};
use crate::{Error, Result};

/// Helper to construct a Central with optional configuration.
pub struct CentralBuilder {
    transport: Option<Box<dyn Transport>>,
    clock: Option<Box<dyn Clock>>,
    config: CentralConfig,
}

impl CentralBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            clock: None,
            config: CentralConfig::default(),
        }
    }

    /// Provide an already-created transport instance (e.g. MockTransport)
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to [`CentralConfig::default`].
    pub fn with_config(mut self, config: CentralConfig) -> Self {
        self.config = config;
        self
    }

    /// Requires a transport; otherwise returns TransportMissing.
    pub fn build(self) -> Result<Central<Disabled>> {
        let transport = self.transport.ok_or(Error::TransportMissing)?;
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));
        Ok(Central::new(transport, clock, self.config))
    }
}

impl Default for CentralBuilder {
    fn default() -> Self {
        Self::new()
    }
}
