use tracing::info;

/// Running counters of the inbound path.
#[derive(Debug, Default, Clone)]
pub struct DrainStats {
    pub interrupts: u64,
    pub bytes_received: u64,
    pub bytes_discarded: u64,
    /// Times the shared ring had no room for pending data.
    pub buffer_full: u64,
    pub notifications: u64,
    since_report: u64,
}

impl DrainStats {
    pub(crate) fn record_received(&mut self, n: usize, report_interval: u64) {
        self.bytes_received += n as u64;
        self.since_report += n as u64;
        if report_interval > 0 && self.since_report >= report_interval {
            self.since_report = 0;
            info!(
                bytes_received = self.bytes_received,
                bytes_discarded = self.bytes_discarded,
                interrupts = self.interrupts,
                buffer_full = self.buffer_full,
                bytes_per_interrupt = self.bytes_per_interrupt(),
                "uart drain statistics"
            );
        }
    }

    pub fn bytes_per_interrupt(&self) -> u64 {
        self.bytes_received
            .checked_div(self.interrupts)
            .unwrap_or(self.bytes_received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_window_resets() {
        let mut stats = DrainStats::default();
        stats.record_received(60, 100);
        assert_eq!(stats.since_report, 60);
        stats.record_received(60, 100);
        assert_eq!(stats.since_report, 0);
        assert_eq!(stats.bytes_received, 120);
    }

    #[test]
    fn test_bytes_per_interrupt() {
        let mut stats = DrainStats::default();
        stats.record_received(10, 0);
        assert_eq!(stats.bytes_per_interrupt(), 10);
        stats.interrupts = 4;
        stats.record_received(30, 0);
        assert_eq!(stats.bytes_per_interrupt(), 10);
    }
}
