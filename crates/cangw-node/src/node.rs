//! Daemon orchestration: device bring-up, job installation, runtime loop.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use cangw_core::checksum::{Crc8Checksum, Crc8Profile, XorChecksum, crc8_table};
use cangw_core::frame::{CanFilter, CanFrame};
use cangw_core::modify::{MOD_DATA, MOD_DLC, MOD_ID};
use cangw_core::wire::{
    AttrTag, FLAG_ECHO, FLAG_SRC_TSTAMP, GwMessageBuilder, GwMsgHead,
};
use cangw_gateway::device::DeviceType;
use cangw_gateway::{Gateway, MemBus};

use crate::config::{ChecksumCrc8Entry, GatewayConfig, JobEntry, ModEntry, parse_data_word};
use crate::error::NodeError;

/// Handle for requesting daemon shutdown from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The running daemon: bus, gateway core, and configuration.
pub struct Node {
    config: GatewayConfig,
    bus: Arc<MemBus>,
    gateway: Gateway,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Node {
    /// Build the bus and devices from configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let bus = Arc::new(MemBus::new());
        for dev in &config.devices {
            bus.add_device(dev.index, &dev.name, DeviceType::Can, dev.up);
            info!(name = %dev.name, index = dev.index, up = dev.up, "device registered");
        }
        let gateway = Gateway::with_capacity(config.gateway.capacity, bus.clone(), bus.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            bus,
            gateway,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn bus(&self) -> &Arc<MemBus> {
        &self.bus
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Install every configured job through the control plane. Returns the
    /// number of installed jobs.
    pub fn install_jobs(&self) -> Result<usize, NodeError> {
        for job in &self.config.jobs {
            let request = encode_job_request(&self.config, job)?;
            self.gateway.create_job(&request)?;
        }
        info!(count = self.config.jobs.len(), "installed configured jobs");
        Ok(self.config.jobs.len())
    }

    /// Run until shutdown is requested, periodically logging counters.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let interval_secs = self.config.gateway.stats_interval;

        if interval_secs == 0 {
            let _ = shutdown_rx.changed().await;
        } else {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.log_counters(),
                    _ = shutdown_rx.changed() => break,
                }
            }
        }
    }

    /// Tear down all jobs.
    pub fn shutdown(&self) {
        self.gateway.shutdown();
        info!("gateway shut down");
    }

    fn log_counters(&self) {
        for job in self.gateway.table().snapshot().iter() {
            info!(
                src = job.src_dev().name(),
                dst = job.dst_dev().name(),
                handled = job.handled(),
                dropped = job.dropped(),
                "job counters"
            );
        }
    }
}

/// Encode one configured job as a create request.
fn encode_job_request(config: &GatewayConfig, job: &JobEntry) -> Result<Vec<u8>, NodeError> {
    let src_idx = config.device_index(&job.src)?;
    let dst_idx = config.device_index(&job.dst)?;

    let mut flags = 0u16;
    if job.echo {
        flags |= FLAG_ECHO;
    }
    if job.keep_timestamp {
        flags |= FLAG_SRC_TSTAMP;
    }

    let mut builder = GwMessageBuilder::new(GwMsgHead::can_can(flags));

    for (tag, entry) in [
        (AttrTag::ModAnd, &job.mod_and),
        (AttrTag::ModOr, &job.mod_or),
        (AttrTag::ModXor, &job.mod_xor),
        (AttrTag::ModSet, &job.mod_set),
    ] {
        if let Some(entry) = entry {
            let (modtype, frame) = mod_template(entry)?;
            if modtype == 0 {
                warn!(?tag, "modification entry selects no fields, skipping");
                continue;
            }
            builder = builder.mod_slot(tag, modtype, &frame);
        }
    }

    if let Some(csum) = &job.checksum_xor {
        builder = builder.csum_xor(&XorChecksum {
            from_idx: csum.from,
            to_idx: csum.to,
            result_idx: csum.result,
            init_xor_val: csum.init,
        });
    }
    if let Some(csum) = &job.checksum_crc8 {
        builder = builder.csum_crc8(&crc8_spec(csum)?);
    }

    if let Some(filter) = &job.filter {
        builder = builder.filter(&CanFilter::new(filter.id, filter.mask));
    }

    Ok(builder.src_if(src_idx).dst_if(dst_idx).finish())
}

/// Build the template frame and field mask from a slot entry.
fn mod_template(entry: &ModEntry) -> Result<(u8, CanFrame), NodeError> {
    let mut modtype = 0u8;
    let mut frame = CanFrame::default();
    if let Some(id) = entry.id {
        modtype |= MOD_ID;
        frame.can_id = id;
    }
    if let Some(dlc) = entry.dlc {
        modtype |= MOD_DLC;
        frame.can_dlc = dlc;
    }
    if let Some(data) = &entry.data {
        modtype |= MOD_DATA;
        frame.set_data_u64(parse_data_word(data)?);
    }
    Ok((modtype, frame))
}

fn crc8_spec(entry: &ChecksumCrc8Entry) -> Result<Crc8Checksum, NodeError> {
    let profile = match entry.profile.as_deref() {
        None => Crc8Profile::Unspec,
        Some("xor-value") => Crc8Profile::XorValue(entry.profile_data),
        Some("xor-dlc") => Crc8Profile::XorDlc,
        Some(other) => {
            return Err(NodeError::Config(format!(
                "unknown crc8 profile {other:?} (expected \"xor-value\" or \"xor-dlc\")"
            )));
        }
    };
    Ok(Crc8Checksum {
        from_idx: entry.from,
        to_idx: entry.to,
        result_idx: entry.result,
        init_crc_val: entry.init,
        final_xor_val: entry.final_xor,
        crctab: crc8_table(entry.poly),
        profile,
    })
}
