use crate::{
    common::{unlikely, OverflowPlacement},
    dataport_trace,
    ringbuf::RingBuf,
    sync::Ordering,
    DataportError,
};
use core::ptr::NonNull;
use std::os::fd::BorrowedFd;

enum OverflowFlag {
    /// Stored in the last byte of the region.
    Shared,
    Internal(bool),
}

/// Producer view of an inbound dataport.
///
/// This is the only writer of the write index and of the payload bytes. The
/// consumer owns the read index; nothing here ever stores to it. There are no
/// locks: the two sides meet only through the release/acquire pair on the
/// indices.
pub struct CircularByteBuffer {
    ringbuf: RingBuf,
    overflow: OverflowFlag,
}

impl CircularByteBuffer {
    /// Creates a memfd-backed region of `region_size` bytes and lays the ring
    /// out inside it. The payload capacity is whatever remains after the index
    /// header and, for [`OverflowPlacement::LastByte`], the trailing flag byte.
    pub fn new(region_size: usize, placement: OverflowPlacement) -> Result<Self, DataportError> {
        let ringbuf = RingBuf::new(region_size, placement)?;
        Ok(Self::from_ringbuf(ringbuf))
    }

    /// Lays the ring out over an existing shared region and resets it to the
    /// empty, non-overflowed state.
    ///
    /// # Safety
    ///
    /// `base` must point to `len` bytes that stay mapped, readable and writable
    /// for the lifetime of the returned buffer, and that no other producer
    /// writes to.
    pub unsafe fn from_raw_parts(
        base: NonNull<u8>,
        len: usize,
        placement: OverflowPlacement,
    ) -> Result<Self, DataportError> {
        let mut ringbuf = unsafe { RingBuf::from_raw_parts(base, len, placement)? };
        ringbuf.init();
        Ok(Self::from_ringbuf(ringbuf))
    }

    fn from_ringbuf(ringbuf: RingBuf) -> Self {
        let overflow = match ringbuf.placement() {
            OverflowPlacement::LastByte => OverflowFlag::Shared,
            OverflowPlacement::Internal => OverflowFlag::Internal(false),
        };
        CircularByteBuffer { ringbuf, overflow }
    }

    pub fn capacity(&self) -> usize {
        self.ringbuf.capacity()
    }

    pub fn occupied(&self) -> usize {
        self.ringbuf.occupied()
    }

    pub fn free_space(&self) -> usize {
        self.capacity() - self.occupied()
    }

    pub fn region_size(&self) -> usize {
        self.ringbuf.size()
    }

    pub fn placement(&self) -> OverflowPlacement {
        self.ringbuf.placement()
    }

    /// File descriptor of the backing memfd, when this buffer allocated it.
    pub fn memory_fd(&self) -> Option<BorrowedFd<'_>> {
        self.ringbuf.memory_fd()
    }

    fn contiguous_free(&self) -> (usize, usize) {
        let free = self.free_space();
        let offset = self.ringbuf.offset(self.ringbuf.write_pos());
        (offset, free.min(self.capacity() - offset))
    }

    /// The largest free run starting at the write index. It can be shorter
    /// than [`free_space`](Self::free_space) when the free space wraps.
    ///
    /// Bytes written here stay invisible to the consumer until
    /// [`commit`](Self::commit).
    pub fn write_contiguous(&mut self) -> &mut [u8] {
        let (offset, len) = self.contiguous_free();
        unsafe { std::slice::from_raw_parts_mut(self.ringbuf.data_ptr().add(offset), len) }
    }

    /// Makes `n` bytes previously written through
    /// [`write_contiguous`](Self::write_contiguous) visible to the consumer.
    pub fn commit(&mut self, n: usize) -> Result<(), DataportError> {
        let (_, available) = self.contiguous_free();
        if unlikely(n > available) {
            return Err(DataportError::CommitOverrun {
                requested: n,
                available,
            });
        }
        self.publish(n);
        Ok(())
    }

    fn publish(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let write_pos = self.ringbuf.write_pos() + n as u64;
        self.ringbuf.advance_write(write_pos);
        dataport_trace!(write_pos, committed = n, "dataport commit");
    }

    /// Copies as much of `buf` as fits, splitting across the wrap point if
    /// needed, and returns the number of bytes accepted. A short count means
    /// the ring did not have `buf.len()` bytes free; nothing else changes.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let mut written = 0;
        while written < buf.len() {
            let window = self.write_contiguous();
            if window.is_empty() {
                break;
            }
            let n = window.len().min(buf.len() - written);
            window[..n].copy_from_slice(&buf[written..written + n]);
            self.publish(n);
            written += n;
        }
        written
    }

    pub fn is_overflow(&self) -> bool {
        match self.overflow {
            OverflowFlag::Shared => self
                .ringbuf
                .shared_overflow()
                .is_some_and(|flag| flag.load(Ordering::Acquire) != 0),
            OverflowFlag::Internal(set) => set,
        }
    }

    pub fn set_overflow(&mut self) {
        self.store_overflow(true);
    }

    /// Resets the sticky overflow flag. Nothing in the drain path calls this;
    /// it is left to whatever protocol the consumer side runs.
    pub fn clear_overflow(&mut self) {
        self.store_overflow(false);
    }

    fn store_overflow(&mut self, value: bool) {
        match &mut self.overflow {
            OverflowFlag::Shared => {
                if let Some(flag) = self.ringbuf.shared_overflow() {
                    flag.store(value as u8, Ordering::Release);
                }
            }
            OverflowFlag::Internal(set) => *set = value,
        }
    }
}
