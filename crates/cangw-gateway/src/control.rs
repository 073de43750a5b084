//! Control-plane request handling.
//!
//! Parses configuration messages, validates them, and mutates the job
//! table. Validation runs cheapest-first: header checks, then attribute
//! parsing (including checksum index ranges), then interface index
//! checks, and device resolution last. Acquired device references are
//! plain `Arc`s, so any later failure releases them on return.

use std::sync::Arc;

use tracing::{debug, info};

use cangw_core::checksum::{ChecksumSpecs, indices_valid};
use cangw_core::modify::{FrameModification, ModFieldMask, ModParams, ModSlot};
use cangw_core::wire::{
    AF_CAN, AttrTag, Attrs, GWTYPE_CAN_CAN, GwMessageBuilder, GwMsgHead, decode_csum_crc8,
    decode_csum_xor, decode_filter, decode_mod, decode_u32, parse_head,
};

use crate::delivery::FrameDelivery;
use crate::device::{CanDevice, DeviceEvent, DeviceRegistry, DeviceType};
use crate::error::ControlError;
use crate::job::{CanCanRoute, GatewayJob, GatewayKind, JobFlags, JobParams};
use crate::table::{DEFAULT_CAPACITY, JobTable};

/// One page of an in-progress dump, resumable via `next_index`.
#[derive(Debug, Clone)]
pub struct DumpPage {
    /// One encoded descriptor message per job.
    pub records: Vec<Vec<u8>>,
    /// Cursor to pass as `start` of the next page.
    pub next_index: usize,
    /// Whether the dump reached the end of the table.
    pub done: bool,
}

/// A request's payload after attribute parsing.
struct ParsedRequest {
    modification: FrameModification,
    route: CanCanRoute,
}

/// The gateway core: job table plus the external collaborators it drives.
pub struct Gateway {
    table: JobTable,
    devices: Arc<dyn DeviceRegistry>,
    delivery: Arc<dyn FrameDelivery>,
}

impl Gateway {
    pub fn new(devices: Arc<dyn DeviceRegistry>, delivery: Arc<dyn FrameDelivery>) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, devices, delivery)
    }

    pub fn with_capacity(
        capacity: usize,
        devices: Arc<dyn DeviceRegistry>,
        delivery: Arc<dyn FrameDelivery>,
    ) -> Self {
        Self {
            table: JobTable::with_capacity(capacity),
            devices,
            delivery,
        }
    }

    pub fn table(&self) -> &JobTable {
        &self.table
    }

    /// Install a job from an encoded create request.
    pub fn create_job(&self, msg: &[u8]) -> Result<(), ControlError> {
        let (head, region) = parse_head(msg)?;
        check_head(&head)?;

        let parsed = parse_request(region)?;
        let route = parsed.route;

        // Index 0 is the flush-all marker and never names an interface.
        if route.src_idx == 0 || route.dst_idx == 0 {
            return Err(ControlError::InvalidArgument(
                "interface indices are mandatory for job creation",
            ));
        }

        let src_dev = self.resolve_can_device(route.src_idx)?;
        let dst_dev = self.resolve_can_device(route.dst_idx)?;

        let job = Arc::new(GatewayJob::new(JobParams {
            kind: GatewayKind::CanToCan,
            flags: JobFlags::from_bits(head.flags),
            route,
            modification: parsed.modification,
            src_dev: src_dev.clone(),
            dst_dev,
        }));

        self.delivery
            .register_rx(&src_dev, route.filter.can_id, route.filter.can_mask, job.clone())?;

        if let Err(full) = self.table.insert(job.clone()) {
            self.teardown(&job);
            return Err(full.into());
        }

        info!(
            src = job.src_dev().name(),
            dst = job.dst_dev().name(),
            can_id = route.filter.can_id,
            can_mask = route.filter.can_mask,
            "installed gateway job"
        );
        Ok(())
    }

    /// Remove the first job matching an encoded delete request, or every
    /// job when both interface indices are zero.
    pub fn remove_job(&self, msg: &[u8]) -> Result<(), ControlError> {
        let (head, region) = parse_head(msg)?;
        check_head(&head)?;

        let parsed = parse_request(region)?;
        let route = parsed.route;

        // Both indices zero: flush every routing entry.
        if route.src_idx == 0 && route.dst_idx == 0 {
            self.remove_all_jobs();
            return Ok(());
        }

        let flags = JobFlags::from_bits(head.flags);
        let removed = self
            .table
            .remove_first_match(|job| job.matches_template(flags, &parsed.modification, &route))
            .ok_or(ControlError::InvalidArgument("no matching job"))?;
        self.teardown(&removed);

        info!(
            src = removed.src_dev().name(),
            dst = removed.dst_dev().name(),
            "removed gateway job"
        );
        Ok(())
    }

    /// Remove every installed job.
    pub fn remove_all_jobs(&self) {
        let removed = self.table.remove_all();
        for job in &removed {
            self.teardown(job);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "flushed all gateway jobs");
        }
    }

    /// Encode one descriptor per job into a size-bounded page, starting at
    /// `start`. Fails only when even the first record would not fit.
    pub fn dump_jobs(&self, start: usize, capacity: usize) -> Result<DumpPage, ControlError> {
        let snapshot = self.table.snapshot();
        let mut records = Vec::new();
        let mut used = 0;
        let mut index = start;
        while index < snapshot.len() {
            let record = encode_job(&snapshot[index]);
            if used + record.len() > capacity {
                if records.is_empty() {
                    return Err(ControlError::DumpBufferFull);
                }
                break;
            }
            used += record.len();
            records.push(record);
            index += 1;
        }
        debug!(start, emitted = records.len(), "dumped gateway jobs");
        Ok(DumpPage {
            records,
            next_index: index,
            done: index >= snapshot.len(),
        })
    }

    /// React to a device lifecycle notification.
    pub fn handle_device_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Unregister(dev) => {
                if dev.dev_type() != DeviceType::Can {
                    return;
                }
                let removed = self.table.remove_by_device(dev);
                for job in &removed {
                    self.teardown(job);
                }
                if !removed.is_empty() {
                    info!(
                        dev = dev.name(),
                        count = removed.len(),
                        "removed jobs for unregistering device"
                    );
                }
            }
        }
    }

    /// Tear everything down. In-flight dispatches complete against their
    /// own record references before those are reclaimed.
    pub fn shutdown(&self) {
        self.remove_all_jobs();
    }

    fn resolve_can_device(&self, index: u32) -> Result<Arc<CanDevice>, ControlError> {
        let dev = self
            .devices
            .dev_by_index(index)
            .ok_or(ControlError::NoSuchDevice(index))?;
        if dev.dev_type() != DeviceType::Can {
            return Err(ControlError::NotACanDevice(index));
        }
        Ok(dev)
    }

    fn teardown(&self, job: &Arc<GatewayJob>) {
        let filter = job.route().filter;
        self.delivery
            .unregister_rx(job.src_dev(), filter.can_id, filter.can_mask, job);
    }
}

/// Cheap header rejects, run before anything else.
fn check_head(head: &GwMsgHead) -> Result<(), ControlError> {
    if head.family != AF_CAN {
        return Err(ControlError::ProtocolFamilyNotSupported(head.family));
    }
    if head.gwtype != GWTYPE_CAN_CAN {
        return Err(ControlError::InvalidArgument("unknown gateway type"));
    }
    Ok(())
}

/// Parse the attribute region shared by create and delete requests.
fn parse_request(region: &[u8]) -> Result<ParsedRequest, ControlError> {
    // Collect attributes; a repeated tag keeps its last occurrence.
    const TAG_SLOTS: usize = AttrTag::Dropped as usize + 1;
    let mut tb: [Option<&[u8]>; TAG_SLOTS] = [None; TAG_SLOTS];
    for attr in Attrs::new(region) {
        let attr = attr?;
        if let Some(tag) = AttrTag::from_u8(attr.tag) {
            tb[tag as usize] = Some(attr.payload);
        }
    }
    let get = |tag: AttrTag| tb[tag as usize];

    let slot = |tag: AttrTag| -> ModSlot {
        get(tag)
            .and_then(decode_mod)
            .map(|(modtype, frame)| ModSlot::new(ModFieldMask::from_bits(modtype), frame))
            .unwrap_or_default()
    };
    let and = slot(AttrTag::ModAnd);
    let or = slot(AttrTag::ModOr);
    let xor = slot(AttrTag::ModXor);
    let set = slot(AttrTag::ModSet);

    // Checksum specs only take effect alongside actual modifications.
    let mut csum = ChecksumSpecs::default();
    let has_mods = [&and, &or, &xor, &set].iter().any(|s| !s.mask.is_empty());
    if has_mods {
        if let Some(spec) = get(AttrTag::CsumXor).and_then(decode_csum_xor) {
            if !indices_valid(spec.from_idx, spec.to_idx, spec.result_idx) {
                return Err(ControlError::InvalidArgument(
                    "xor checksum indices out of range",
                ));
            }
            csum.xor = spec;
        }
        if let Some(spec) = get(AttrTag::CsumCrc8).and_then(decode_csum_crc8) {
            if !indices_valid(spec.from_idx, spec.to_idx, spec.result_idx) {
                return Err(ControlError::InvalidArgument(
                    "crc8 checksum indices out of range",
                ));
            }
            csum.crc8 = spec;
        }
    }

    let modification = FrameModification::from_params(ModParams {
        and,
        or,
        xor,
        set,
        csum,
    });

    let filter = get(AttrTag::Filter)
        .and_then(decode_filter)
        .unwrap_or_default();

    // Specifying both interfaces is mandatory.
    let (Some(src_payload), Some(dst_payload)) = (get(AttrTag::SrcIf), get(AttrTag::DstIf)) else {
        return Err(ControlError::NoSuchDevice(0));
    };
    let src_idx = decode_u32(src_payload).unwrap_or(0);
    let dst_idx = decode_u32(dst_payload).unwrap_or(0);

    // Both zero is the flush-all marker; exactly one zero is an error.
    if (src_idx == 0) != (dst_idx == 0) {
        return Err(ControlError::InvalidArgument(
            "exactly one interface index is zero",
        ));
    }

    Ok(ParsedRequest {
        modification,
        route: CanCanRoute {
            filter,
            src_idx,
            dst_idx,
        },
    })
}

/// Encode a job descriptor, emitting only non-default attributes.
fn encode_job(job: &GatewayJob) -> Vec<u8> {
    let mut builder = GwMessageBuilder::new(GwMsgHead::can_can(job.flags().bits()));

    let handled = job.handled();
    if handled > 0 {
        builder = builder.handled(handled);
    }
    let dropped = job.dropped();
    if dropped > 0 {
        builder = builder.dropped(dropped);
    }

    let modification = job.modification();
    for (tag, slot) in [
        (AttrTag::ModAnd, modification.and()),
        (AttrTag::ModOr, modification.or()),
        (AttrTag::ModXor, modification.xor()),
        (AttrTag::ModSet, modification.set()),
    ] {
        if slot.mask.bits() != 0 {
            builder = builder.mod_slot(tag, slot.mask.bits(), &slot.frame);
        }
    }

    let csum = modification.csum();
    if csum.xor.enabled() {
        builder = builder.csum_xor(&csum.xor);
    }
    if csum.crc8.enabled() {
        builder = builder.csum_crc8(&csum.crc8);
    }

    let route = job.route();
    if !route.filter.is_match_all() {
        builder = builder.filter(&route.filter);
    }
    builder = builder.src_if(route.src_idx).dst_if(route.dst_idx);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membus::MemBus;
    use cangw_core::checksum::XorChecksum;
    use cangw_core::error::WireError;
    use cangw_core::frame::{CanFilter, CanFrame};
    use cangw_core::modify::MOD_ID;

    fn setup() -> (Arc<MemBus>, Gateway) {
        let bus = Arc::new(MemBus::new());
        bus.add_device(1, "can0", DeviceType::Can, true);
        bus.add_device(2, "can1", DeviceType::Can, true);
        let gateway = Gateway::new(bus.clone(), bus.clone());
        (bus, gateway)
    }

    fn forward_request(src: u32, dst: u32) -> Vec<u8> {
        GwMessageBuilder::new(GwMsgHead::can_can(0))
            .src_if(src)
            .dst_if(dst)
            .finish()
    }

    #[test]
    fn create_installs_job() {
        let (_bus, gateway) = setup();
        gateway.create_job(&forward_request(1, 2)).unwrap();
        assert_eq!(gateway.table().len(), 1);
        let job = gateway.table().snapshot()[0].clone();
        assert_eq!(job.route().src_idx, 1);
        assert_eq!(job.route().dst_idx, 2);
        assert!(job.modification().is_identity());
    }

    #[test]
    fn create_rejects_wrong_family() {
        let (_bus, gateway) = setup();
        let msg = GwMessageBuilder::new(GwMsgHead {
            family: 2,
            gwtype: GWTYPE_CAN_CAN,
            flags: 0,
        })
        .src_if(1)
        .dst_if(2)
        .finish();
        assert!(matches!(
            gateway.create_job(&msg),
            Err(ControlError::ProtocolFamilyNotSupported(2))
        ));
        assert!(gateway.table().is_empty());
    }

    #[test]
    fn create_rejects_unknown_gwtype() {
        let (_bus, gateway) = setup();
        let msg = GwMessageBuilder::new(GwMsgHead {
            family: AF_CAN,
            gwtype: 9,
            flags: 0,
        })
        .src_if(1)
        .dst_if(2)
        .finish();
        assert!(matches!(
            gateway.create_job(&msg),
            Err(ControlError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_rejects_short_message() {
        let (_bus, gateway) = setup();
        assert!(matches!(
            gateway.create_job(&[0u8; 3]),
            Err(ControlError::Wire(WireError::MessageTooSmall { .. }))
        ));
    }

    #[test]
    fn create_requires_both_interfaces() {
        let (_bus, gateway) = setup();
        let msg = GwMessageBuilder::new(GwMsgHead::can_can(0))
            .src_if(1)
            .finish();
        assert!(matches!(
            gateway.create_job(&msg),
            Err(ControlError::NoSuchDevice(0))
        ));
    }

    #[test]
    fn create_rejects_zero_indices() {
        let (_bus, gateway) = setup();
        assert!(matches!(
            gateway.create_job(&forward_request(0, 2)),
            Err(ControlError::InvalidArgument(_))
        ));
        assert!(matches!(
            gateway.create_job(&forward_request(0, 0)),
            Err(ControlError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_rejects_unknown_device() {
        let (_bus, gateway) = setup();
        assert!(matches!(
            gateway.create_job(&forward_request(1, 9)),
            Err(ControlError::NoSuchDevice(9))
        ));
    }

    #[test]
    fn create_rejects_non_can_device() {
        let (bus, gateway) = setup();
        bus.add_device(3, "eth0", DeviceType::Other, true);
        assert!(matches!(
            gateway.create_job(&forward_request(3, 2)),
            Err(ControlError::NotACanDevice(3))
        ));
        assert!(matches!(
            gateway.create_job(&forward_request(1, 3)),
            Err(ControlError::NotACanDevice(3))
        ));
        assert!(gateway.table().is_empty());
    }

    #[test]
    fn create_rejects_bad_checksum_indices() {
        let (_bus, gateway) = setup();
        let set_id = CanFrame::new(0x7FF, &[]).unwrap();
        let msg = GwMessageBuilder::new(GwMsgHead::can_can(0))
            .mod_slot(AttrTag::ModSet, MOD_ID, &set_id)
            .csum_xor(&XorChecksum {
                from_idx: 8,
                to_idx: 0,
                result_idx: 0,
                init_xor_val: 0,
            })
            .src_if(1)
            .dst_if(2)
            .finish();
        assert!(matches!(
            gateway.create_job(&msg),
            Err(ControlError::InvalidArgument(_))
        ));
        assert!(gateway.table().is_empty());
    }

    #[test]
    fn checksum_without_modification_parses_as_disabled() {
        let (_bus, gateway) = setup();
        let msg = GwMessageBuilder::new(GwMsgHead::can_can(0))
            .csum_xor(&XorChecksum {
                from_idx: 0,
                to_idx: 1,
                result_idx: 2,
                init_xor_val: 0,
            })
            .src_if(1)
            .dst_if(2)
            .finish();
        gateway.create_job(&msg).unwrap();
        let job = gateway.table().snapshot()[0].clone();
        assert!(!job.modification().csum().xor.enabled());
    }

    #[test]
    fn create_at_capacity_rolls_back_registration() {
        let bus = Arc::new(MemBus::new());
        bus.add_device(1, "can0", DeviceType::Can, true);
        bus.add_device(2, "can1", DeviceType::Can, true);
        let gateway = Gateway::with_capacity(1, bus.clone(), bus.clone());

        gateway.create_job(&forward_request(1, 2)).unwrap();
        assert!(matches!(
            gateway.create_job(&forward_request(1, 2)),
            Err(ControlError::OutOfMemory(_))
        ));
        assert_eq!(gateway.table().len(), 1);
        assert_eq!(bus.rx_registrations(), 1);
    }

    #[test]
    fn delete_matches_first_only() {
        let (bus, gateway) = setup();
        gateway.create_job(&forward_request(1, 2)).unwrap();
        gateway.create_job(&forward_request(1, 2)).unwrap();
        assert_eq!(gateway.table().len(), 2);

        gateway.remove_job(&forward_request(1, 2)).unwrap();
        assert_eq!(gateway.table().len(), 1);
        assert_eq!(bus.rx_registrations(), 1);

        gateway.remove_job(&forward_request(1, 2)).unwrap();
        assert!(gateway.table().is_empty());
        assert!(matches!(
            gateway.remove_job(&forward_request(1, 2)),
            Err(ControlError::InvalidArgument(_))
        ));
    }

    #[test]
    fn delete_matches_structurally() {
        let (_bus, gateway) = setup();
        let set_id = CanFrame::new(0x7FF, &[]).unwrap();
        let with_mod = GwMessageBuilder::new(GwMsgHead::can_can(0))
            .mod_slot(AttrTag::ModSet, MOD_ID, &set_id)
            .src_if(1)
            .dst_if(2)
            .finish();
        gateway.create_job(&with_mod).unwrap();

        // A template without the modification misses.
        assert!(matches!(
            gateway.remove_job(&forward_request(1, 2)),
            Err(ControlError::InvalidArgument(_))
        ));
        // Differing flags miss too.
        let wrong_flags = GwMessageBuilder::new(GwMsgHead::can_can(1))
            .mod_slot(AttrTag::ModSet, MOD_ID, &set_id)
            .src_if(1)
            .dst_if(2)
            .finish();
        assert!(gateway.remove_job(&wrong_flags).is_err());

        gateway.remove_job(&with_mod).unwrap();
        assert!(gateway.table().is_empty());
    }

    #[test]
    fn delete_all_with_zero_indices() {
        let (bus, gateway) = setup();
        gateway.create_job(&forward_request(1, 2)).unwrap();
        gateway.create_job(&forward_request(2, 1)).unwrap();

        gateway.remove_job(&forward_request(0, 0)).unwrap();
        assert!(gateway.table().is_empty());
        assert_eq!(bus.rx_registrations(), 0);

        // Idempotent: flushing an empty table succeeds.
        gateway.remove_job(&forward_request(0, 0)).unwrap();
    }

    #[test]
    fn dump_round_trips_create_request() {
        let (_bus, gateway) = setup();
        let set_id = CanFrame::new(0x7FF, &[]).unwrap();
        let request = GwMessageBuilder::new(GwMsgHead::can_can(cangw_core::wire::FLAG_ECHO))
            .mod_slot(AttrTag::ModSet, MOD_ID, &set_id)
            .filter(&CanFilter::new(0x123, 0x7FF))
            .src_if(1)
            .dst_if(2)
            .finish();
        gateway.create_job(&request).unwrap();

        let page = gateway.dump_jobs(0, 4096).unwrap();
        assert!(page.done);
        assert_eq!(page.records.len(), 1);
        // With zero counters the descriptor reconstructs the request.
        assert_eq!(page.records[0], request);

        // And the descriptor works as a delete template.
        gateway.remove_job(&page.records[0]).unwrap();
        assert!(gateway.table().is_empty());
    }

    #[test]
    fn dump_pages_resume_via_cursor() {
        let (_bus, gateway) = setup();
        for _ in 0..4 {
            gateway.create_job(&forward_request(1, 2)).unwrap();
        }
        let record_len = gateway.dump_jobs(0, 4096).unwrap().records[0].len();

        let first = gateway.dump_jobs(0, record_len * 2).unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.next_index, 2);
        assert!(!first.done);

        let second = gateway.dump_jobs(first.next_index, record_len * 2).unwrap();
        assert_eq!(second.records.len(), 2);
        assert!(second.done);
    }

    #[test]
    fn dump_too_small_for_one_record() {
        let (_bus, gateway) = setup();
        gateway.create_job(&forward_request(1, 2)).unwrap();
        assert!(matches!(
            gateway.dump_jobs(0, 4),
            Err(ControlError::DumpBufferFull)
        ));
    }

    #[test]
    fn dump_empty_table_completes() {
        let (_bus, gateway) = setup();
        let page = gateway.dump_jobs(0, 4096).unwrap();
        assert!(page.records.is_empty());
        assert!(page.done);
    }

    #[test]
    fn device_unregister_cascade() {
        let (bus, gateway) = setup();
        bus.add_device(3, "can2", DeviceType::Can, true);
        gateway.create_job(&forward_request(1, 2)).unwrap();
        gateway.create_job(&forward_request(2, 3)).unwrap();
        gateway.create_job(&forward_request(1, 3)).unwrap();

        let dev = bus.remove_device(2).unwrap();
        gateway.handle_device_event(&DeviceEvent::Unregister(dev));

        assert_eq!(gateway.table().len(), 1);
        let survivor = gateway.table().snapshot()[0].clone();
        assert_eq!(survivor.route(), &CanCanRoute {
            filter: CanFilter::default(),
            src_idx: 1,
            dst_idx: 3,
        });
    }

    #[test]
    fn shutdown_unregisters_everything() {
        let (bus, gateway) = setup();
        gateway.create_job(&forward_request(1, 2)).unwrap();
        gateway.create_job(&forward_request(2, 1)).unwrap();
        gateway.shutdown();
        assert!(gateway.table().is_empty());
        assert_eq!(bus.rx_registrations(), 0);
    }
}
