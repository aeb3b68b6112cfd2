use crate::{
    common::OverflowPlacement, dataport_trace, ringbuf::RingBuf, sync::notification::Notification,
    sync::Ordering, CircularByteBuffer, DataportError,
};
use core::ptr::NonNull;
use std::os::fd::OwnedFd;

/// Consumer view of an inbound dataport.
///
/// The consumer is the sole writer of the read index. It never touches the
/// write index or payload bytes outside the readable range.
pub struct Consumer {
    ringbuf: RingBuf,
    notification: Option<Notification>,
}

impl Consumer {
    /// Maps the region behind `memory_fd`. `region_size` and `placement`
    /// must match what the producer was created with.
    pub fn from_fd(
        memory_fd: OwnedFd,
        region_size: usize,
        placement: OverflowPlacement,
    ) -> Result<Self, DataportError> {
        let ringbuf = RingBuf::from_fd(memory_fd, region_size, placement)?;
        Ok(Consumer {
            ringbuf,
            notification: None,
        })
    }

    /// # Safety
    ///
    /// `base` must point to a region already laid out by a
    /// [`CircularByteBuffer`] of the same `len` and `placement`, and stay
    /// mapped for the lifetime of the returned consumer.
    pub unsafe fn from_raw_parts(
        base: NonNull<u8>,
        len: usize,
        placement: OverflowPlacement,
    ) -> Result<Self, DataportError> {
        let ringbuf = unsafe { RingBuf::from_raw_parts(base, len, placement)? };
        Ok(Consumer {
            ringbuf,
            notification: None,
        })
    }

    /// Attaches to the memfd behind `producer` through a second mapping.
    pub fn attach(producer: &CircularByteBuffer) -> Result<Self, DataportError> {
        let fd = producer
            .memory_fd()
            .ok_or(DataportError::Memory(
                "producer region is not memfd-backed".to_string(),
            ))?
            .try_clone_to_owned()?;
        Self::from_fd(fd, producer.region_size(), producer.placement())
    }

    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn capacity(&self) -> usize {
        self.ringbuf.capacity()
    }

    /// Bytes committed by the producer and not yet consumed.
    pub fn available(&self) -> usize {
        self.ringbuf.occupied()
    }

    /// The readable bytes up to the wrap point.
    pub fn read_contiguous(&self) -> &[u8] {
        let available = self.available();
        let offset = self.ringbuf.offset(self.ringbuf.read_pos());
        let len = available.min(self.capacity() - offset);
        unsafe { std::slice::from_raw_parts(self.ringbuf.data_ptr().add(offset), len) }
    }

    /// Releases `n` bytes back to the producer.
    pub fn consume(&mut self, n: usize) -> Result<(), DataportError> {
        let available = self.available();
        if n > available {
            return Err(DataportError::ConsumeOverrun {
                requested: n,
                available,
            });
        }
        self.advance(n);
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let read_pos = self.ringbuf.read_pos() + n as u64;
        self.ringbuf.advance_read(read_pos);
        dataport_trace!(read_pos, consumed = n, "dataport consume");
    }

    /// Copies up to `buf.len()` readable bytes out and consumes them.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            let window = self.read_contiguous();
            if window.is_empty() {
                break;
            }
            let n = window.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&window[..n]);
            self.advance(n);
            copied += n;
        }
        copied
    }

    /// The sticky overflow flag, or `None` when the producer keeps it
    /// outside the shared region.
    pub fn is_overflow(&self) -> Option<bool> {
        self.ringbuf
            .shared_overflow()
            .map(|flag| flag.load(Ordering::Acquire) != 0)
    }

    pub fn clear_overflow(&self) -> Result<(), DataportError> {
        let flag = self
            .ringbuf
            .shared_overflow()
            .ok_or(DataportError::OverflowNotShared)?;
        flag.store(0, Ordering::Release);
        Ok(())
    }

    /// Blocks until the producer signals. Signals raised while nobody was
    /// waiting collapse into a single wakeup.
    pub fn wait(&self) -> Result<(), DataportError> {
        self.notification
            .as_ref()
            .ok_or(DataportError::NoNotification)?
            .wait()
    }
}
