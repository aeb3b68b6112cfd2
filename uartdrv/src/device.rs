use nix::errno::Errno;
use nix::sys::termios::{self, SetArg};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::{debug, warn};

/// Handle on the serial hardware.
///
/// Reads and writes never block: a read with nothing pending returns `Ok(0)`,
/// and a write may accept fewer bytes than offered. A read must never report
/// more bytes than the buffer it was given.
pub trait Device {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Lets the device acknowledge its interrupt source before draining.
    fn handle_interrupt(&mut self) {}
}

/// A device reached through a non-blocking file descriptor, such as a TTY
/// node or one end of a socket pair.
pub struct FdDevice {
    file: File,
}

impl FdDevice {
    /// Opens a device node read/write, non-blocking, without making it the
    /// controlling terminal. TTYs are switched to raw mode so no line
    /// discipline rewrites the byte stream.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)?;
        debug!(path = %path.display(), "opened serial device");

        let device = FdDevice { file };
        device.make_raw();
        Ok(device)
    }

    /// Wraps an already-open descriptor. The caller is responsible for
    /// having put it into non-blocking mode.
    pub fn from_fd(fd: OwnedFd) -> Self {
        FdDevice {
            file: File::from(fd),
        }
    }

    fn make_raw(&self) {
        match termios::tcgetattr(&self.file) {
            Ok(mut attrs) => {
                termios::cfmakeraw(&mut attrs);
                if let Err(e) = termios::tcsetattr(&self.file, SetArg::TCSANOW, &attrs) {
                    warn!(error = %e, "failed to switch device to raw mode");
                }
            }
            Err(Errno::ENOTTY) => {}
            Err(e) => warn!(error = %e, "failed to query terminal attributes"),
        }
    }
}

impl Device for FdDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.file.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl AsFd for FdDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn socket_device() -> (FdDevice, UnixStream) {
        let (local, peer) = UnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        (FdDevice::from_fd(OwnedFd::from(local)), peer)
    }

    #[test]
    fn test_empty_read_returns_zero() {
        let (mut device, _peer) = socket_device();
        let mut buf = [0u8; 16];
        assert_eq!(device.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_is_bounded_by_buffer() {
        let (mut device, mut peer) = socket_device();
        peer.write_all(b"0123456789").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(device.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        let mut rest = [0u8; 16];
        assert_eq!(device.read(&mut rest).unwrap(), 6);
        assert_eq!(&rest[..6], b"456789");
    }

    #[test]
    fn test_write_reaches_peer() {
        let (mut device, mut peer) = socket_device();
        assert_eq!(device.write(b"ping").unwrap(), 4);

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_open_regular_file_is_not_a_tty() -> io::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), b"abc")?;

        let mut device = FdDevice::open(file.path())?;
        let mut buf = [0u8; 8];
        assert_eq!(device.read(&mut buf)?, 3);
        Ok(())
    }
}
