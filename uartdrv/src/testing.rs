use crate::{Device, Notify};
use dataport::{region_size_for, CircularByteBuffer, Consumer, DataportError, OverflowPlacement};
use std::cell::Cell;
use std::collections::VecDeque;
use std::io;

pub(crate) enum ReadEvent {
    Error(io::ErrorKind),
    /// Claims to have read this many bytes regardless of the buffer size.
    Bogus(usize),
}

/// Device double with a hardware-like receive FIFO: a read takes at most the
/// requested number of bytes and leaves the rest queued.
#[derive(Default)]
pub(crate) struct ScriptedDevice {
    fifo: VecDeque<u8>,
    events: VecDeque<ReadEvent>,
    pub(crate) reads: usize,
    pub(crate) interrupts: usize,
    pub(crate) written: Vec<u8>,
    /// Maximum bytes accepted per write call.
    pub(crate) write_limit: Option<usize>,
    pub(crate) write_error: Option<io::ErrorKind>,
}

impl ScriptedDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn feed(&mut self, bytes: &[u8]) {
        self.fifo.extend(bytes);
    }

    pub(crate) fn push_event(&mut self, event: ReadEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn pending(&self) -> usize {
        self.fifo.len()
    }
}

impl Device for ScriptedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        match self.events.pop_front() {
            Some(ReadEvent::Error(kind)) => return Err(io::Error::from(kind)),
            Some(ReadEvent::Bogus(n)) => return Ok(n),
            None => {}
        }
        let n = buf.len().min(self.fifo.len());
        for (slot, byte) in buf.iter_mut().zip(self.fifo.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error {
            return Err(io::Error::from(kind));
        }
        let n = match self.write_limit {
            Some(limit) => limit.min(buf.len()),
            None => buf.len(),
        };
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn handle_interrupt(&mut self) {
        self.interrupts += 1;
    }
}

#[derive(Default)]
pub(crate) struct CountingNotifier {
    count: Cell<usize>,
}

impl CountingNotifier {
    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }

    pub(crate) fn reset(&self) {
        self.count.set(0);
    }
}

impl Notify for CountingNotifier {
    fn notify(&self) -> Result<(), DataportError> {
        self.count.set(self.count.get() + 1);
        Ok(())
    }
}

pub(crate) fn ring(capacity: usize) -> (CircularByteBuffer, Consumer) {
    let placement = OverflowPlacement::LastByte;
    let size = region_size_for(capacity, placement);
    let producer = CircularByteBuffer::new(size, placement).unwrap();
    let consumer = Consumer::attach(&producer).unwrap();
    (producer, consumer)
}

pub(crate) fn drain_all(consumer: &mut Consumer) -> Vec<u8> {
    let mut out = vec![0u8; consumer.capacity()];
    let n = consumer.read(&mut out);
    out.truncate(n);
    out
}
