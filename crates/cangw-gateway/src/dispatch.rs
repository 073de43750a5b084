//! The per-frame receive hot path.
//!
//! Invoked by the delivery backend once per frame matching a job's
//! registered filter. Non-blocking and non-suspending: no lock is taken,
//! no allocation happens beyond the frame value copy, and errors never
//! propagate upward. Losses show up only in the job's drop counter.

use tracing::trace;

use crate::delivery::{FrameDelivery, RxFrame};
use crate::job::GatewayJob;

/// Process one received frame for one job.
pub fn forward_frame(job: &GatewayJob, rx: &RxFrame, delivery: &dyn FrameDelivery) {
    // Frames the gateway already routed are never picked up again,
    // breaking the cycle between cross-registered jobs.
    if rx.gateway_routed {
        return;
    }

    let dst = job.dst_dev();
    if !dst.is_up() {
        trace!(dst = dst.name(), "destination down, dropping frame");
        job.note_dropped();
        return;
    }

    // Duplicate with an independently mutable payload, mark as routed,
    // and retarget to the destination interface.
    let mut out = *rx;
    out.gateway_routed = true;
    out.dev = dst.index();

    let modification = job.modification();
    modification.apply(&mut out.frame);

    // Checksums only follow actual modifications.
    if !modification.is_identity() {
        let csum = modification.csum();
        if csum.xor.enabled() {
            csum.xor.apply(&mut out.frame);
        }
        if csum.crc8.enabled() {
            csum.crc8.apply(&mut out.frame);
        }
    }

    if !job.flags().src_timestamp {
        out.timestamp = None;
    }

    match delivery.send(out, job.flags().echo) {
        Ok(()) => job.note_handled(),
        Err(err) => {
            trace!(dst = dst.name(), %err, "send failed, dropping frame");
            job.note_dropped();
        }
    }
}
