use crate::{
    common::{Header, OverflowPlacement, HEADER_ALIGN, HEADER_SIZE},
    memory::Memory,
    sync::{AtomicU8, Ordering},
    DataportError,
};
use core::ptr::NonNull;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

/// One mapping of an inbound dataport: index header, payload, and (per
/// placement) the overflow byte at the very end.
pub(crate) struct RingBuf {
    base: NonNull<u8>,
    size: usize,
    capacity: usize,
    placement: OverflowPlacement,
    memory: Option<Memory>,
}

impl RingBuf {
    /// Allocates a fresh shared region and initializes its header.
    pub(crate) fn new(size: usize, placement: OverflowPlacement) -> Result<Self, DataportError> {
        capacity_for(size, placement)?;
        let memory = Memory::new(size)?;
        let mut ringbuf = unsafe { Self::from_raw_parts(memory.as_ptr(), size, placement)? };
        ringbuf.init();
        ringbuf.memory = Some(memory);
        Ok(ringbuf)
    }

    /// Maps an existing region without touching its contents.
    pub(crate) fn from_fd(
        fd: OwnedFd,
        size: usize,
        placement: OverflowPlacement,
    ) -> Result<Self, DataportError> {
        capacity_for(size, placement)?;
        let memory = Memory::from_fd(fd, size)?;
        let mut ringbuf = unsafe { Self::from_raw_parts(memory.as_ptr(), size, placement)? };
        ringbuf.memory = Some(memory);
        Ok(ringbuf)
    }

    /// # Safety
    ///
    /// `base` must point to `size` bytes that stay mapped, readable and
    /// writable for the lifetime of the returned value.
    pub(crate) unsafe fn from_raw_parts(
        base: NonNull<u8>,
        size: usize,
        placement: OverflowPlacement,
    ) -> Result<Self, DataportError> {
        let capacity = capacity_for(size, placement)?;
        let addr = base.as_ptr() as usize;
        if addr % HEADER_ALIGN != 0 {
            return Err(DataportError::Misaligned(addr));
        }

        Ok(RingBuf {
            base,
            size,
            capacity,
            placement,
            memory: None,
        })
    }

    pub(crate) fn init(&mut self) {
        unsafe {
            (self.base.as_ptr() as *mut Header).write(Header::new());
        }
        if let Some(flag) = self.shared_overflow() {
            flag.store(0, Ordering::Release);
        }
    }

    pub(crate) fn header(&self) -> &Header {
        unsafe { &*(self.base.as_ptr() as *const Header) }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn placement(&self) -> OverflowPlacement {
        self.placement
    }

    pub(crate) fn data_ptr(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(HEADER_SIZE) }
    }

    pub(crate) fn offset(&self, pos: u64) -> usize {
        (pos % self.capacity as u64) as usize
    }

    pub(crate) fn write_pos(&self) -> u64 {
        self.header().write_pos.load(Ordering::Acquire)
    }

    pub(crate) fn read_pos(&self) -> u64 {
        self.header().read_pos.load(Ordering::Acquire)
    }

    /// Publishes `pos`. The release store orders every payload byte written
    /// before it ahead of the index update.
    pub(crate) fn advance_write(&self, pos: u64) {
        self.header().write_pos.store(pos, Ordering::Release);
    }

    pub(crate) fn advance_read(&self, pos: u64) {
        self.header().read_pos.store(pos, Ordering::Release);
    }

    /// Bytes between the two indices, clamped so a misbehaving peer can
    /// never make the ring look larger than it is.
    pub(crate) fn occupied(&self) -> usize {
        let write_pos = self.write_pos();
        let read_pos = self.read_pos();
        (write_pos.saturating_sub(read_pos) as usize).min(self.capacity)
    }

    pub(crate) fn shared_overflow(&self) -> Option<&AtomicU8> {
        match self.placement {
            OverflowPlacement::LastByte => {
                let flag = unsafe { self.base.as_ptr().add(self.size - 1) } as *const AtomicU8;
                Some(unsafe { &*flag })
            }
            OverflowPlacement::Internal => None,
        }
    }

    pub(crate) fn memory_fd(&self) -> Option<BorrowedFd<'_>> {
        self.memory.as_ref().map(|memory| memory.fd().as_fd())
    }
}

unsafe impl Send for RingBuf {}

/// Payload capacity left in a region of `size` bytes once the header and the
/// overflow reservation are taken out.
pub(crate) fn capacity_for(
    size: usize,
    placement: OverflowPlacement,
) -> Result<usize, DataportError> {
    let reserved = HEADER_SIZE + placement.reserved();
    match size.checked_sub(reserved) {
        Some(capacity) if capacity > 0 => Ok(capacity),
        _ => Err(DataportError::RegionTooSmall {
            size,
            required: reserved + 1,
        }),
    }
}
