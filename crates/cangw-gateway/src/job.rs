//! Gateway job records.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use cangw_core::frame::CanFilter;
use cangw_core::modify::FrameModification;
use cangw_core::wire::{FLAG_ECHO, FLAG_SRC_TSTAMP};

use crate::device::CanDevice;

/// Routing kind of a job. Only CAN-to-CAN routing is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    CanToCan,
}

/// Per-job behavior flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFlags {
    /// Pass the echo request through to the send primitive.
    pub echo: bool,
    /// Keep the receive timestamp on forwarded frames.
    pub src_timestamp: bool,
}

impl JobFlags {
    pub fn from_bits(bits: u16) -> Self {
        Self {
            echo: bits & FLAG_ECHO != 0,
            src_timestamp: bits & FLAG_SRC_TSTAMP != 0,
        }
    }

    #[must_use]
    pub fn bits(self) -> u16 {
        (if self.echo { FLAG_ECHO } else { 0 })
            | (if self.src_timestamp { FLAG_SRC_TSTAMP } else { 0 })
    }
}

/// The CAN-to-CAN binding of a job: receive filter and the two interface
/// indices it was installed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanCanRoute {
    pub filter: CanFilter,
    pub src_idx: u32,
    pub dst_idx: u32,
}

/// Constructor parameters for [`GatewayJob::new`].
pub struct JobParams {
    pub kind: GatewayKind,
    pub flags: JobFlags,
    pub route: CanCanRoute,
    pub modification: FrameModification,
    pub src_dev: Arc<CanDevice>,
    pub dst_dev: Arc<CanDevice>,
}

/// One published forwarding rule.
///
/// After publication the only mutable state is the two counters, updated
/// with relaxed ordering from concurrent receive contexts; everything else
/// is frozen at creation.
#[derive(Debug)]
pub struct GatewayJob {
    kind: GatewayKind,
    flags: JobFlags,
    route: CanCanRoute,
    modification: FrameModification,
    src_dev: Arc<CanDevice>,
    dst_dev: Arc<CanDevice>,
    handled: AtomicU32,
    dropped: AtomicU32,
}

impl GatewayJob {
    pub fn new(params: JobParams) -> Self {
        Self {
            kind: params.kind,
            flags: params.flags,
            route: params.route,
            modification: params.modification,
            src_dev: params.src_dev,
            dst_dev: params.dst_dev,
            handled: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> GatewayKind {
        self.kind
    }

    #[must_use]
    pub fn flags(&self) -> JobFlags {
        self.flags
    }

    #[must_use]
    pub fn route(&self) -> &CanCanRoute {
        &self.route
    }

    #[must_use]
    pub fn modification(&self) -> &FrameModification {
        &self.modification
    }

    #[must_use]
    pub fn src_dev(&self) -> &Arc<CanDevice> {
        &self.src_dev
    }

    #[must_use]
    pub fn dst_dev(&self) -> &Arc<CanDevice> {
        &self.dst_dev
    }

    /// Frames forwarded successfully.
    #[must_use]
    pub fn handled(&self) -> u32 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Frames lost to a down destination, or a failed send.
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn note_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Structural removal predicate: a delete request matches the first
    /// job whose flags, modification state, and route equal the request's.
    #[must_use]
    pub fn matches_template(
        &self,
        flags: JobFlags,
        modification: &FrameModification,
        route: &CanCanRoute,
    ) -> bool {
        self.flags == flags && self.modification == *modification && self.route == *route
    }

    /// Whether either endpoint of the job is the given device.
    #[must_use]
    pub fn references_device(&self, dev: &Arc<CanDevice>) -> bool {
        Arc::ptr_eq(&self.src_dev, dev) || Arc::ptr_eq(&self.dst_dev, dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use cangw_core::frame::CanFrame;
    use cangw_core::modify::{MOD_ID, ModFieldMask, ModParams, ModSlot};

    fn dev(index: u32) -> Arc<CanDevice> {
        Arc::new(CanDevice::new(index, format!("can{index}"), DeviceType::Can))
    }

    fn job(flags: JobFlags, modification: FrameModification, route: CanCanRoute) -> GatewayJob {
        GatewayJob::new(JobParams {
            kind: GatewayKind::CanToCan,
            flags,
            route,
            modification,
            src_dev: dev(route.src_idx),
            dst_dev: dev(route.dst_idx),
        })
    }

    #[test]
    fn flags_roundtrip_bits() {
        for bits in [0u16, FLAG_ECHO, FLAG_SRC_TSTAMP, FLAG_ECHO | FLAG_SRC_TSTAMP] {
            assert_eq!(JobFlags::from_bits(bits).bits(), bits);
        }
        // Unassigned bits are not representable and drop out.
        assert_eq!(JobFlags::from_bits(0xFFFC).bits(), 0);
    }

    #[test]
    fn counters_start_zero_and_accumulate() {
        let j = job(
            JobFlags::default(),
            FrameModification::identity(),
            CanCanRoute {
                filter: CanFilter::default(),
                src_idx: 1,
                dst_idx: 2,
            },
        );
        assert_eq!((j.handled(), j.dropped()), (0, 0));
        j.note_handled();
        j.note_handled();
        j.note_dropped();
        assert_eq!((j.handled(), j.dropped()), (2, 1));
    }

    #[test]
    fn template_match_is_structural() {
        let route = CanCanRoute {
            filter: CanFilter::new(0x123, 0x7FF),
            src_idx: 1,
            dst_idx: 2,
        };
        let modification = FrameModification::from_params(ModParams {
            set: ModSlot::new(
                ModFieldMask::from_bits(MOD_ID),
                CanFrame::new(0x7FF, &[]).unwrap(),
            ),
            ..Default::default()
        });
        let j = job(JobFlags::default(), modification.clone(), route);

        assert!(j.matches_template(JobFlags::default(), &modification, &route));
        // Any differing component misses.
        assert!(!j.matches_template(
            JobFlags {
                echo: true,
                ..Default::default()
            },
            &modification,
            &route
        ));
        assert!(!j.matches_template(JobFlags::default(), &FrameModification::identity(), &route));
        assert!(!j.matches_template(
            JobFlags::default(),
            &modification,
            &CanCanRoute {
                dst_idx: 3,
                ..route
            }
        ));
    }

    #[test]
    fn references_device_by_handle() {
        let src = dev(1);
        let dst = dev(2);
        let other = dev(1);
        let j = GatewayJob::new(JobParams {
            kind: GatewayKind::CanToCan,
            flags: JobFlags::default(),
            route: CanCanRoute::default(),
            modification: FrameModification::identity(),
            src_dev: src.clone(),
            dst_dev: dst.clone(),
        });
        assert!(j.references_device(&src));
        assert!(j.references_device(&dst));
        // Same index, different registry handle: not the same device.
        assert!(!j.references_device(&other));
    }
}
