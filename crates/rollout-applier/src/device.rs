//! Device registry and transport interfaces.
//!
//! Both are external collaborators: the registry answers environment and
//! capability questions for risk assessment, and the transport is the
//! opaque read/write channel to one device. Real implementations (REST,
//! SSH) live outside this workspace; [`crate::mock`] provides in-memory
//! ones.

use crate::error::{ApplierError, TransportError};
use async_trait::async_trait;
use rollout_core::model::DeviceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Where a device runs; drives risk assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEnvironment {
    Production,
    Staging,
    Lab,
}

impl DeviceEnvironment {
    pub fn is_production(self) -> bool {
        matches!(self, DeviceEnvironment::Production)
    }
}

/// Registry view of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub environment: DeviceEnvironment,
    /// Feature markers such as `wireless`, `firewall`, `dhcp-server`
    pub capability_flags: Vec<String>,
    /// Currently associated clients, used as a blast-radius signal
    pub active_clients: u32,
}

impl DeviceInfo {
    pub fn has_capability(&self, flag: &str) -> bool {
        self.capability_flags.iter().any(|f| f == flag)
    }
}

/// Lookup of device metadata, consulted by appliers for risk assessment
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn get_device(&self, device_id: &DeviceId) -> Result<DeviceInfo, ApplierError>;
}

/// Opaque read/write channel to one device's configuration tree.
///
/// Paths are slash-separated configuration locations
/// (e.g. `/interface/wireless`); values are JSON documents. Timeouts are
/// the transport implementation's responsibility and surface as
/// [`TransportError::Timeout`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read the subtree at `path`
    async fn fetch(&self, path: &str) -> Result<Value, TransportError>;

    /// Replace the subtree at `path`
    async fn submit(&self, path: &str, payload: Value) -> Result<(), TransportError>;
}

/// A scoped transport lease.
///
/// The transport is exclusively owned for the duration of one device's
/// apply sequence and released on drop, on every exit path.
pub struct TransportHandle {
    transport: Arc<dyn Transport>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl TransportHandle {
    pub fn new(transport: Arc<dyn Transport>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            transport,
            release: Some(Box::new(release)),
        }
    }

    /// A handle with no release action (for tests and simple factories)
    pub fn unmanaged(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            release: None,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl std::ops::Deref for TransportHandle {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        self.transport.as_ref()
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

/// Acquires scoped transports for devices
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn acquire(&self, device_id: &DeviceId) -> Result<TransportHandle, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn fetch(&self, _path: &str) -> Result<Value, TransportError> {
            Ok(Value::Null)
        }

        async fn submit(&self, _path: &str, _payload: Value) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn handle_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let handle = TransportHandle::new(Arc::new(NullTransport), move || {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!released.load(Ordering::SeqCst));
        drop(handle);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn capability_flags() {
        let info = DeviceInfo {
            id: DeviceId::from("ap-1"),
            environment: DeviceEnvironment::Lab,
            capability_flags: vec!["wireless".to_string()],
            active_clients: 0,
        };
        assert!(info.has_capability("wireless"));
        assert!(!info.has_capability("firewall"));
    }
}
