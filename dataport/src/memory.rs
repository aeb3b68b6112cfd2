use crate::error::DataportError;
use core::ptr::NonNull;
use eyre::{ensure, Result, WrapErr};
use nix::sys::memfd::{memfd_create, MFdFlags};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::unistd::ftruncate;
use std::num::NonZero;
use std::os::fd::OwnedFd;

/// A memfd-backed region mapped shared, so every mapping of the same file
/// descriptor (in this or another process) observes the same bytes.
pub struct Memory {
    ptr: NonNull<u8>,
    size: usize,
    fd: OwnedFd,
}

impl Memory {
    pub fn new(size: usize) -> Result<Self> {
        ensure!(
            size > 0,
            DataportError::RegionTooSmall { size, required: 1 }
        );

        let fd = memfd_create(c"dataport", MFdFlags::MFD_CLOEXEC)
            .wrap_err("failed to create memory file descriptor")?;

        ftruncate(&fd, size as i64).wrap_err("failed to set memory file size")?;

        Self::map(fd, size)
    }

    pub fn from_fd(fd: OwnedFd, size: usize) -> Result<Self> {
        let stat = nix::sys::stat::fstat(&fd).wrap_err("failed to stat memory file descriptor")?;
        let file_size = stat.st_size as usize;
        ensure!(
            file_size >= size,
            DataportError::RegionTooSmall {
                size: file_size,
                required: size
            }
        );

        Self::map(fd, size)
    }

    fn map(fd: OwnedFd, size: usize) -> Result<Self> {
        let len = NonZero::new(size).ok_or(DataportError::RegionTooSmall { size, required: 1 })?;

        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
            .wrap_err("failed to map shared region")?
        };

        Ok(Memory {
            ptr: ptr.cast(),
            size,
            fd,
        })
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fd(&self) -> &OwnedFd {
        &self.fd
    }

    #[cfg(test)]
    pub(crate) fn clone_fd(&self) -> std::io::Result<OwnedFd> {
        self.fd.try_clone()
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.cast(), self.size);
        }
    }
}

unsafe impl Send for Memory {}
unsafe impl Sync for Memory {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_mappings_share_bytes() -> Result<()> {
        let size = 512;
        let first = Memory::new(size)?;
        let second = Memory::from_fd(first.clone_fd()?, size)?;

        assert_ne!(first.as_ptr(), second.as_ptr());

        unsafe {
            for i in 0..size {
                first.as_ptr().as_ptr().add(i).write((i % 251) as u8);
            }
            for i in 0..size {
                let actual = second.as_ptr().as_ptr().add(i).read();
                assert_eq!(actual, (i % 251) as u8, "mismatch at position {}", i);
            }
        }

        Ok(())
    }

    #[test]
    fn test_new_region_is_zeroed() -> Result<()> {
        let memory = Memory::new(64)?;
        let bytes = unsafe { std::slice::from_raw_parts(memory.as_ptr().as_ptr(), memory.size()) };
        assert!(bytes.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_zero_size_rejected() {
        let Err(err) = Memory::new(0) else {
            panic!("zero-sized region must be rejected");
        };
        assert!(matches!(
            err.downcast_ref::<DataportError>(),
            Some(DataportError::RegionTooSmall { size: 0, .. })
        ));
    }

    #[test]
    fn test_attach_larger_than_file_rejected() -> Result<()> {
        let memory = Memory::new(64)?;
        assert!(Memory::from_fd(memory.clone_fd()?, 128).is_err());
        Ok(())
    }
}
