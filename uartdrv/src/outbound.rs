use crate::{config::WritePolicy, device::Device, DriverError, Result};
use dataport::OutboundPort;
use tracing::{debug, error};

/// Sends a prefix of the outbound dataport to the device, synchronously and
/// without buffering.
pub struct OutboundWriter {
    port: OutboundPort,
    policy: WritePolicy,
}

impl OutboundWriter {
    pub fn new(port: OutboundPort, policy: WritePolicy) -> Self {
        OutboundWriter { port, policy }
    }

    pub fn port(&self) -> &OutboundPort {
        &self.port
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Pushes the first `len` bytes of the port to `device`.
    ///
    /// Under [`WritePolicy::ReportShort`] the device is offered the data once
    /// and a partial acceptance is an error. Under [`WritePolicy::Retry`] the
    /// remainder is offered again until everything was taken.
    pub fn write<D: Device>(&self, device: &mut D, len: usize) -> Result<usize> {
        let capacity = self.port.size();
        if len > capacity {
            error!(requested = len, capacity, "write exceeds port size");
            return Err(DriverError::WriteTooLong {
                requested: len,
                capacity,
            });
        }

        let data = &self.port.as_slice()[..len];
        let mut written = 0;
        while written < len {
            let remaining = len - written;
            let n = device.write(&data[written..]).map_err(|e| {
                error!(error = %e, written, requested = len, "device write failed");
                DriverError::DeviceIo(e)
            })?;
            if n > remaining {
                error!(
                    returned = n,
                    requested = remaining,
                    "device write exceeds requested length"
                );
                return Err(DriverError::ConsistencyViolation {
                    returned: n,
                    requested: remaining,
                });
            }
            written += n;

            match self.policy {
                WritePolicy::ReportShort if written < len => {
                    error!(written, requested = len, "short write to device");
                    return Err(DriverError::ShortWrite {
                        written,
                        requested: len,
                    });
                }
                WritePolicy::ReportShort => {}
                WritePolicy::Retry if n == 0 => std::hint::spin_loop(),
                WritePolicy::Retry => {}
            }
        }

        debug!(written, "outbound write complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDevice;
    use rstest::*;
    use std::io;

    fn writer(policy: WritePolicy, payload: &[u8]) -> OutboundWriter {
        let mut port = OutboundPort::new(64).unwrap();
        port.as_mut_slice()[..payload.len()].copy_from_slice(payload);
        OutboundWriter::new(port, policy)
    }

    #[rstest]
    #[case::report_short(WritePolicy::ReportShort)]
    #[case::retry(WritePolicy::Retry)]
    fn test_full_write(#[case] policy: WritePolicy) {
        let writer = writer(policy, b"hello world");
        assert_eq!(writer.policy(), policy);
        let mut device = ScriptedDevice::new();

        assert_eq!(writer.write(&mut device, 5).unwrap(), 5);
        assert_eq!(device.written, b"hello");
    }

    #[rstest]
    fn test_zero_length_write_touches_nothing() {
        let writer = writer(WritePolicy::ReportShort, b"");
        let mut device = ScriptedDevice::new();
        device.write_error = Some(io::ErrorKind::Other);

        assert_eq!(writer.write(&mut device, 0).unwrap(), 0);
    }

    #[rstest]
    #[case::report_short(WritePolicy::ReportShort)]
    #[case::retry(WritePolicy::Retry)]
    fn test_oversized_request_rejected(#[case] policy: WritePolicy) {
        let writer = writer(policy, b"");
        let mut device = ScriptedDevice::new();

        let result = writer.write(&mut device, 65);
        assert!(matches!(
            result,
            Err(DriverError::WriteTooLong {
                requested: 65,
                capacity: 64
            })
        ));
        assert!(device.written.is_empty());
    }

    #[rstest]
    fn test_short_write_reported() {
        let writer = writer(WritePolicy::ReportShort, b"abcdefgh");
        let mut device = ScriptedDevice::new();
        device.write_limit = Some(3);

        let result = writer.write(&mut device, 8);
        assert!(matches!(
            result,
            Err(DriverError::ShortWrite {
                written: 3,
                requested: 8
            })
        ));
        assert_eq!(device.written, b"abc");
    }

    #[rstest]
    fn test_retry_completes_short_writes() {
        let writer = writer(WritePolicy::Retry, b"abcdefgh");
        let mut device = ScriptedDevice::new();
        device.write_limit = Some(3);

        assert_eq!(writer.write(&mut device, 8).unwrap(), 8);
        assert_eq!(device.written, b"abcdefgh");
    }

    #[rstest]
    #[case::report_short(WritePolicy::ReportShort)]
    #[case::retry(WritePolicy::Retry)]
    fn test_device_error_aborts(#[case] policy: WritePolicy) {
        let writer = writer(policy, b"abc");
        let mut device = ScriptedDevice::new();
        device.write_error = Some(io::ErrorKind::BrokenPipe);

        let result = writer.write(&mut device, 3);
        assert!(matches!(result, Err(DriverError::DeviceIo(_))));
    }
}
