//! Interop runtime context.
//!
//! An [`InteropRuntime`] bundles everything the adapters share: the host
//! handle, the exception mapper resolved against the host's registry and the
//! bridge configuration. It is a cheap-to-clone handle; every adapter keeps
//! one.

use std::fmt;
use std::rc::Rc;

use host_runtime::{HostException, HostRuntime};

use crate::config::BridgeConfig;
use crate::error::GuestException;
use crate::exception_map::ExceptionMapper;

struct RuntimeInner {
    host: HostRuntime,
    mapper: ExceptionMapper,
    config: BridgeConfig,
}

/// Shared context of the interop adapters.
#[derive(Clone)]
pub struct InteropRuntime {
    inner: Rc<RuntimeInner>,
}

impl InteropRuntime {
    /// Create a runtime with the default configuration
    pub fn new(host: HostRuntime) -> Self {
        Self::with_config(host, BridgeConfig::default())
    }

    /// Create a runtime with an explicit configuration
    pub fn with_config(host: HostRuntime, config: BridgeConfig) -> Self {
        let mapper = ExceptionMapper::new(&host);
        Self {
            inner: Rc::new(RuntimeInner {
                host,
                mapper,
                config,
            }),
        }
    }

    pub fn host(&self) -> &HostRuntime {
        &self.inner.host
    }

    pub fn mapper(&self) -> &ExceptionMapper {
        &self.inner.mapper
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Re-kind a host failure for the guest
    pub fn map_host_error(&self, exc: &HostException) -> GuestException {
        self.inner.mapper.to_guest(exc)
    }

    /// Raise a guest failure into the host
    pub fn map_guest_error(&self, exc: &GuestException) -> HostException {
        self.inner.mapper.to_host(exc)
    }
}

impl fmt::Debug for InteropRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteropRuntime")
            .field("host_types", &self.inner.host.types().len())
            .field("config", &self.inner.config)
            .finish()
    }
}
