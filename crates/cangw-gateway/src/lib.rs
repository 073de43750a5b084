//! CAN frame gateway routing engine.
//!
//! This crate holds the moving parts of the gateway: job records and the
//! concurrent job table, the per-frame receive hot path, the control-plane
//! request handlers, and the device/delivery abstractions the engine is
//! wired to. An in-memory bus backend is included for local operation and
//! testing.

pub mod control;
pub mod delivery;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod membus;
pub mod table;

pub use control::{DumpPage, Gateway};
pub use delivery::{FrameDelivery, RxFrame};
pub use device::{CanDevice, DeviceEvent, DeviceRegistry, DeviceType};
pub use dispatch::forward_frame;
pub use error::{ControlError, DeliveryError, TableFull};
pub use job::{CanCanRoute, GatewayJob, GatewayKind, JobFlags, JobParams};
pub use membus::MemBus;
pub use table::JobTable;
