//! In-memory frame bus.
//!
//! A self-contained delivery backend and device registry: devices live in
//! a map, receive registrations in a list, and transmitted frames are both
//! logged and redelivered to receivers on the target interface, exactly
//! like a shared bus, so loop-avoidance behavior is observable. Used by
//! the daemon's local mode and by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cangw_core::frame::{CanFilter, CanFrame};

use crate::delivery::{FrameDelivery, RxFrame};
use crate::device::{CanDevice, DeviceRegistry, DeviceType};
use crate::dispatch::forward_frame;
use crate::error::DeliveryError;
use crate::job::GatewayJob;

struct RxRegistration {
    dev_idx: u32,
    filter: CanFilter,
    job: Arc<GatewayJob>,
}

/// In-memory registry plus delivery backend.
pub struct MemBus {
    devices: Mutex<HashMap<u32, Arc<CanDevice>>>,
    registrations: Mutex<Vec<RxRegistration>>,
    tx_log: Mutex<Vec<(RxFrame, bool)>>,
    failing: Mutex<Vec<u32>>,
    clock: AtomicU64,
}

impl MemBus {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            registrations: Mutex::new(Vec::new()),
            tx_log: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            clock: AtomicU64::new(1),
        }
    }

    fn lock<'a, T>(&self, m: &'a Mutex<T>) -> MutexGuard<'a, T> {
        m.lock().expect("membus state poisoned")
    }

    /// Create and register a device.
    pub fn add_device(
        &self,
        index: u32,
        name: &str,
        dev_type: DeviceType,
        up: bool,
    ) -> Arc<CanDevice> {
        let dev = Arc::new(CanDevice::new(index, name, dev_type));
        dev.set_up(up);
        self.lock(&self.devices).insert(index, dev.clone());
        dev
    }

    /// Drop a device from the registry, returning its handle so the
    /// caller can run the unregister notification against the gateway.
    pub fn remove_device(&self, index: u32) -> Option<Arc<CanDevice>> {
        self.lock(&self.devices).remove(&index)
    }

    /// Put a frame on the bus as freshly received traffic on `dev_idx`.
    pub fn inject(&self, dev_idx: u32, frame: CanFrame) {
        let timestamp = self.clock.fetch_add(1, Ordering::Relaxed);
        self.deliver(RxFrame {
            frame,
            dev: dev_idx,
            timestamp: Some(timestamp),
            gateway_routed: false,
        });
    }

    /// Frames transmitted so far, with their echo flag.
    pub fn sent(&self) -> Vec<(RxFrame, bool)> {
        self.lock(&self.tx_log).clone()
    }

    /// Frames transmitted on one interface.
    pub fn sent_on(&self, dev_idx: u32) -> Vec<CanFrame> {
        self.lock(&self.tx_log)
            .iter()
            .filter(|(f, _)| f.dev == dev_idx)
            .map(|(f, _)| f.frame)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.lock(&self.tx_log).clear();
    }

    /// Make transmission on an interface fail until cleared.
    pub fn set_send_failure(&self, dev_idx: u32, failing: bool) {
        let mut list = self.lock(&self.failing);
        if failing {
            if !list.contains(&dev_idx) {
                list.push(dev_idx);
            }
        } else {
            list.retain(|&d| d != dev_idx);
        }
    }

    /// Number of live receive registrations.
    pub fn rx_registrations(&self) -> usize {
        self.lock(&self.registrations).len()
    }

    /// Run the hot path for every registration matching the frame.
    fn deliver(&self, rx: RxFrame) {
        let matching: Vec<Arc<GatewayJob>> = self
            .lock(&self.registrations)
            .iter()
            .filter(|reg| reg.dev_idx == rx.dev && reg.filter.matches(&rx.frame))
            .map(|reg| reg.job.clone())
            .collect();
        // Registrations are released before dispatch: the hot path may
        // send, which re-enters delivery.
        for job in matching {
            forward_frame(&job, &rx, self);
        }
    }
}

impl Default for MemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry for MemBus {
    fn dev_by_index(&self, index: u32) -> Option<Arc<CanDevice>> {
        if index == 0 {
            return None;
        }
        self.lock(&self.devices).get(&index).cloned()
    }
}

impl FrameDelivery for MemBus {
    fn register_rx(
        &self,
        dev: &Arc<CanDevice>,
        can_id: u32,
        can_mask: u32,
        job: Arc<GatewayJob>,
    ) -> Result<(), DeliveryError> {
        self.lock(&self.registrations).push(RxRegistration {
            dev_idx: dev.index(),
            filter: CanFilter::new(can_id, can_mask),
            job,
        });
        Ok(())
    }

    fn unregister_rx(&self, dev: &Arc<CanDevice>, can_id: u32, can_mask: u32, job: &GatewayJob) {
        let mut regs = self.lock(&self.registrations);
        if let Some(pos) = regs.iter().position(|reg| {
            reg.dev_idx == dev.index()
                && reg.filter == CanFilter::new(can_id, can_mask)
                && std::ptr::eq(reg.job.as_ref(), job)
        }) {
            regs.remove(pos);
        }
    }

    fn send(&self, frame: RxFrame, echo: bool) -> Result<(), DeliveryError> {
        if self.lock(&self.failing).contains(&frame.dev) {
            return Err(DeliveryError::Send(frame.dev));
        }
        self.lock(&self.tx_log).push((frame, echo));
        // A sent frame appears on the target bus segment, visible to any
        // receiver registered there.
        self.deliver(frame);
        Ok(())
    }
}
