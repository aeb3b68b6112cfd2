use crate::{
    backup::BackupQueue,
    config::DriverConfig,
    device::Device,
    drain::{DrainEngine, DrainState},
    notify::Notify,
    outbound::OutboundWriter,
    stats::DrainStats,
    DriverError, Result,
};
use dataport::{CircularByteBuffer, Notification, OutboundPort};
use tracing::{error, info, warn};

/// Everything one driver instance owns: the device, both dataports, the
/// drain engine and the consumer notification.
///
/// A context is built once per device and handed to whoever services the
/// interrupt. Once invalidated, every entry point reports
/// [`DriverError::NotInitialized`] and leaves the device alone.
pub struct DriverContext<D, N = Notification> {
    valid: bool,
    device: D,
    inbound: CircularByteBuffer,
    outbound: OutboundWriter,
    engine: DrainEngine,
    notifier: N,
}

impl<D: Device, N: Notify> DriverContext<D, N> {
    pub fn init(config: &DriverConfig, device: D, notifier: N) -> Result<Self> {
        if let Err(e) = config.validate() {
            error!(error = %e, "rejecting driver configuration");
            return Err(e);
        }

        let inbound = CircularByteBuffer::new(config.inbound_size, config.overflow_placement)?;
        let outbound = OutboundPort::new(config.outbound_size)?;
        info!(
            inbound_size = config.inbound_size,
            capacity = inbound.capacity(),
            placement = ?config.overflow_placement,
            "created inbound dataport"
        );
        info!(size = config.outbound_size, "created outbound dataport");
        info!(
            mode = ?config.mode,
            read_chunk_size = config.read_chunk_size,
            backup_queue_size = config.backup_queue_size,
            overflow_policy = ?config.overflow_policy,
            write_policy = ?config.write_policy,
            "driver initialized"
        );

        Ok(DriverContext {
            valid: true,
            device,
            inbound,
            outbound: OutboundWriter::new(outbound, config.write_policy),
            engine: DrainEngine::new(config),
            notifier,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        if self.valid {
            warn!("driver context invalidated");
        }
        self.valid = false;
    }

    /// Services one device interrupt: acknowledges it and drains the device
    /// into the inbound dataport.
    pub fn handle_interrupt(&mut self) -> Result<()> {
        if !self.valid {
            warn!("interrupt on uninitialized driver context");
            return Err(DriverError::NotInitialized);
        }

        self.engine.record_interrupt();
        self.device.handle_interrupt();
        let result = self
            .engine
            .drain(&mut self.device, &mut self.inbound, &self.notifier);
        if let Err(DriverError::ConsistencyViolation { .. }) = &result {
            self.invalidate();
        }
        result
    }

    /// Transmits the first `len` bytes of the outbound dataport.
    pub fn write(&mut self, len: usize) -> Result<usize> {
        if !self.valid {
            error!(requested = len, "write on uninitialized driver context");
            return Err(DriverError::NotInitialized);
        }
        let result = self.outbound.write(&mut self.device, len);
        if let Err(DriverError::ConsistencyViolation { .. }) = &result {
            self.invalidate();
        }
        result
    }

    /// Resets the sticky overflow flag. Only the consumer side knows when
    /// this is safe, so nothing in the driver calls it on its own.
    pub fn clear_overflow(&mut self) {
        if self.inbound.is_overflow() {
            info!("overflow flag cleared");
        }
        self.inbound.clear_overflow();
    }

    pub fn state(&self) -> DrainState {
        DrainState::of(&self.inbound)
    }

    pub fn inbound(&self) -> &CircularByteBuffer {
        &self.inbound
    }

    pub fn outbound_port(&self) -> &OutboundPort {
        self.outbound.port()
    }

    pub fn stats(&self) -> &DrainStats {
        self.engine.stats()
    }

    pub fn backup(&self) -> Option<&BackupQueue> {
        self.engine.backup()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}
