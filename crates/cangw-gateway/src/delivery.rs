//! Frame delivery subsystem contract.
//!
//! The gateway does not own frame reception or transmission. It registers
//! receive filters with a delivery backend, which invokes the hot path
//! once per matching frame, and hands finished frames back to the backend
//! for transmission.

use std::sync::Arc;

use cangw_core::frame::CanFrame;

use crate::device::CanDevice;
use crate::error::DeliveryError;
use crate::job::GatewayJob;

/// A frame as it travels through the delivery subsystem: the CAN frame
/// itself plus per-hop metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFrame {
    pub frame: CanFrame,
    /// Interface index the frame currently belongs to (receive source, or
    /// transmit target after retargeting).
    pub dev: u32,
    /// Receive timestamp, if the backend stamped one.
    pub timestamp: Option<u64>,
    /// Loop-avoidance marker: set on every frame the gateway emits, so a
    /// frame re-entering a receive path is recognizably already routed.
    pub gateway_routed: bool,
}

impl RxFrame {
    pub fn new(frame: CanFrame, dev: u32) -> Self {
        Self {
            frame,
            dev,
            timestamp: None,
            gateway_routed: false,
        }
    }
}

/// The delivery backend consumed by the gateway.
pub trait FrameDelivery: Send + Sync {
    /// Subscribe a job to frames on `dev` whose masked identifier matches
    /// `(can_id, can_mask)`. The backend invokes the hot path with the job
    /// for every match.
    fn register_rx(
        &self,
        dev: &Arc<CanDevice>,
        can_id: u32,
        can_mask: u32,
        job: Arc<GatewayJob>,
    ) -> Result<(), DeliveryError>;

    /// Drop the subscription installed by [`register_rx`] with the same
    /// parameters.
    ///
    /// [`register_rx`]: FrameDelivery::register_rx
    fn unregister_rx(&self, dev: &Arc<CanDevice>, can_id: u32, can_mask: u32, job: &GatewayJob);

    /// Transmit a frame on its target interface. With `echo` set, the
    /// frame is also observable on the sender's own receive path.
    fn send(&self, frame: RxFrame, echo: bool) -> Result<(), DeliveryError>;
}
