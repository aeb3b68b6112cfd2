use crate::{memory::Memory, DataportError};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

/// A plain shared region with no ring structure, used for the outbound
/// direction: the application fills it, then asks the driver to send a prefix.
pub struct OutboundPort {
    memory: Memory,
}

impl OutboundPort {
    pub fn new(size: usize) -> Result<Self, DataportError> {
        Ok(OutboundPort {
            memory: Memory::new(size)?,
        })
    }

    pub fn from_fd(fd: OwnedFd, size: usize) -> Result<Self, DataportError> {
        Ok(OutboundPort {
            memory: Memory::from_fd(fd, size)?,
        })
    }

    pub fn size(&self) -> usize {
        self.memory.size()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.memory.as_ptr().as_ptr(), self.memory.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.memory.as_ptr().as_ptr(), self.memory.size())
        }
    }

    pub fn memory_fd(&self) -> BorrowedFd<'_> {
        self.memory.fd().as_fd()
    }
}
