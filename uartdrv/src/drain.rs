use crate::{
    backup::BackupQueue,
    config::{DrainMode, DriverConfig, OverflowPolicy},
    device::Device,
    notify::Notify,
    stats::DrainStats,
    DriverError, Result,
};
use dataport::CircularByteBuffer;
use tracing::{error, trace, warn};

/// Whether inbound data is still being delivered.
///
/// This is derived from the buffer's sticky overflow flag and never stored
/// separately. The engine moves `Normal -> Overflow` when it has to drop a
/// byte; only an external `clear_overflow` goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Normal,
    Overflow,
}

impl DrainState {
    pub fn of(buffer: &CircularByteBuffer) -> Self {
        if buffer.is_overflow() {
            DrainState::Overflow
        } else {
            DrainState::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
}

/// Moves bytes from the device into the shared ring, one bounded chunk at a
/// time, with the backup queue absorbing what the ring cannot take.
///
/// Every chunk that reaches a buffer raises a notification, which bounds both
/// the time spent per step and the latency the consumer sees.
pub struct DrainEngine {
    chunk_size: usize,
    staging: Box<[u8]>,
    backup: Option<BackupQueue>,
    mode: DrainMode,
    overflow_policy: OverflowPolicy,
    yield_after_notify: bool,
    stats_interval: u64,
    stats: DrainStats,
}

impl DrainEngine {
    pub fn new(config: &DriverConfig) -> Self {
        let staging = match config.mode {
            DrainMode::Staged => vec![0; config.read_chunk_size].into_boxed_slice(),
            DrainMode::Direct => Box::default(),
        };
        let backup = (config.backup_queue_size > 0)
            .then(|| BackupQueue::new(config.backup_queue_size));

        DrainEngine {
            chunk_size: config.read_chunk_size,
            staging,
            backup,
            mode: config.mode,
            overflow_policy: config.overflow_policy,
            yield_after_notify: config.yield_after_notify,
            stats_interval: config.stats_interval,
            stats: DrainStats::default(),
        }
    }

    pub fn backup(&self) -> Option<&BackupQueue> {
        self.backup.as_ref()
    }

    pub fn stats(&self) -> &DrainStats {
        &self.stats
    }

    pub(crate) fn record_interrupt(&mut self) {
        self.stats.interrupts += 1;
    }

    /// Runs until the device has nothing more to give or nothing more can be
    /// moved. Errors abort the invocation; bytes already delivered stay
    /// delivered.
    pub fn drain<D: Device, N: Notify>(
        &mut self,
        device: &mut D,
        buffer: &mut CircularByteBuffer,
        notifier: &N,
    ) -> Result<()> {
        loop {
            let step = match self.mode {
                DrainMode::Staged => self.step_staged(device, buffer, notifier)?,
                DrainMode::Direct => self.step_direct(device, buffer, notifier)?,
            };
            if step == Step::Done {
                return Ok(());
            }
        }
    }

    fn step_staged<D: Device, N: Notify>(
        &mut self,
        device: &mut D,
        buffer: &mut CircularByteBuffer,
        notifier: &N,
    ) -> Result<Step> {
        if buffer.is_overflow() {
            if self.overflow_policy == OverflowPolicy::Halt {
                return Ok(Step::Done);
            }
            let n = read_into(
                device,
                &mut self.staging,
                &mut self.stats,
                self.stats_interval,
            )?;
            if n == 0 {
                // Wake the consumer once more so it observes the flag.
                self.notify(notifier);
                return Ok(Step::Done);
            }
            self.stats.bytes_discarded += n as u64;
            trace!(discarded = n, "overflow set, discarding chunk");
            return Ok(Step::Continue);
        }

        // Queued bytes are older than anything still in the device, so they
        // go first. New data waits in the device until the next invocation.
        let backup_pending = self.backup.as_ref().is_some_and(|b| !b.is_empty());
        if backup_pending {
            let flushed = self.flush_backup(buffer);
            if flushed > 0 {
                trace!(flushed, "flushed backup queue");
                self.notify(notifier);
                return Ok(Step::Done);
            }
            self.stats.buffer_full += 1;
        }

        let n = read_into(
            device,
            &mut self.staging,
            &mut self.stats,
            self.stats_interval,
        )?;
        if n == 0 {
            return Ok(Step::Done);
        }

        let accepted = if backup_pending {
            0
        } else {
            buffer.write(&self.staging[..n])
        };
        if accepted < n {
            if !backup_pending {
                self.stats.buffer_full += 1;
            }
            self.spill(accepted, n, buffer);
        }
        self.notify(notifier);
        Ok(Step::Continue)
    }

    fn step_direct<D: Device, N: Notify>(
        &mut self,
        device: &mut D,
        buffer: &mut CircularByteBuffer,
        notifier: &N,
    ) -> Result<Step> {
        if buffer.is_overflow() {
            return Ok(Step::Done);
        }

        let window = buffer.write_contiguous();
        let len = window.len().min(self.chunk_size);
        if len == 0 {
            self.stats.buffer_full += 1;
            trace!("shared buffer full, leaving data in the device");
            if self.yield_after_notify {
                std::thread::yield_now();
            }
            return Ok(Step::Done);
        }

        let n = read_into(
            device,
            &mut window[..len],
            &mut self.stats,
            self.stats_interval,
        )?;
        if n == 0 {
            return Ok(Step::Done);
        }
        buffer.commit(n)?;
        self.notify(notifier);
        Ok(Step::Continue)
    }

    fn flush_backup(&mut self, buffer: &mut CircularByteBuffer) -> usize {
        let Some(backup) = self.backup.as_mut() else {
            return 0;
        };
        let mut flushed = 0;
        while let Some(byte) = backup.peek_front() {
            if buffer.write(&[byte]) == 0 {
                break;
            }
            backup.pop();
            flushed += 1;
        }
        flushed
    }

    /// Queues `staging[from..to]` behind whatever is already in the backup
    /// queue and drops what does not fit.
    fn spill(&mut self, from: usize, to: usize, buffer: &mut CircularByteBuffer) {
        let DrainEngine {
            staging,
            backup,
            stats,
            ..
        } = self;
        let rest = &staging[from..to];

        let mut queued = 0;
        if let Some(backup) = backup.as_mut() {
            for &byte in rest {
                if !backup.push(byte) {
                    break;
                }
                queued += 1;
            }
        }

        let lost = rest.len() - queued;
        if lost == 0 {
            return;
        }
        stats.bytes_discarded += lost as u64;
        if !buffer.is_overflow() {
            buffer.set_overflow();
            warn!(
                discarded = lost,
                queued = queued,
                "inbound overflow, dropping data until the flag is cleared"
            );
        }
    }

    fn notify<N: Notify>(&mut self, notifier: &N) {
        if let Err(e) = notifier.notify() {
            warn!(error = %e, "failed to notify consumer");
        }
        self.stats.notifications += 1;
        if self.yield_after_notify {
            std::thread::yield_now();
        }
    }
}

fn read_into<D: Device>(
    device: &mut D,
    buf: &mut [u8],
    stats: &mut DrainStats,
    stats_interval: u64,
) -> Result<usize> {
    let requested = buf.len();
    let n = device.read(buf).map_err(|e| {
        error!(error = %e, "device read failed");
        DriverError::DeviceIo(e)
    })?;
    if n > requested {
        error!(
            returned = n,
            requested = requested,
            "device read exceeds requested length, possible memory corruption"
        );
        return Err(DriverError::ConsistencyViolation {
            returned: n,
            requested,
        });
    }
    stats.record_received(n, stats_interval);
    Ok(n)
}
