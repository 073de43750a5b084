//! Network device handles and registry access.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Link-layer type of a device. Gateway jobs bind only to CAN devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Can,
    Other,
}

/// A network device handle.
///
/// Handles are shared as `Arc<CanDevice>`; a published job owns one
/// reference per endpoint for its whole lifetime, so the strong count
/// reflects gateway ownership. Only the administrative up/down flag is
/// mutable.
#[derive(Debug)]
pub struct CanDevice {
    index: u32,
    name: String,
    dev_type: DeviceType,
    up: AtomicBool,
}

impl CanDevice {
    pub fn new(index: u32, name: impl Into<String>, dev_type: DeviceType) -> Self {
        Self {
            index,
            name: name.into(),
            dev_type,
            up: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dev_type(&self) -> DeviceType {
        self.dev_type
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Release);
    }
}

/// Lookup access to the device registry.
pub trait DeviceRegistry: Send + Sync {
    /// Resolve an interface index to a device handle, acquiring a
    /// reference. Index 0 never resolves.
    fn dev_by_index(&self, index: u32) -> Option<Arc<CanDevice>>;
}

/// Device lifecycle notifications consumed by the gateway.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The device is leaving the registry; all jobs bound to it must be
    /// torn down before the registry expects its references to drain.
    Unregister(Arc<CanDevice>),
}
