//! # dataport - shared-memory byte channels for a serial driver
//!
//! A dataport is a fixed-size memory region shared between the driver and
//! the application that uses it. This crate provides the two kinds the
//! driver needs:
//!
//! - an inbound ring ([`CircularByteBuffer`] on the driver side, [`Consumer`]
//!   on the application side), with a sticky overflow flag that can live in
//!   the last byte of the region;
//! - an outbound [`OutboundPort`], a flat buffer the application fills before
//!   asking the driver to transmit.
//!
//! Regions are `memfd` files mapped with `mmap`, so either side can live in
//! another process after receiving the file descriptor. Wakeups go through
//! an eventfd [`Notification`].
//!
//! ## Inbound ring
//!
//! The ring is strictly single-producer, single-consumer. Each side owns one
//! index in the region header and only loads the other; a commit publishes
//! payload bytes with a release store on the write index.
//!
//! ```rust
//! use dataport::{region_size_for, CircularByteBuffer, Consumer, OverflowPlacement};
//!
//! let placement = OverflowPlacement::LastByte;
//! let mut producer = CircularByteBuffer::new(region_size_for(8, placement), placement)?;
//! let mut consumer = Consumer::attach(&producer)?;
//!
//! assert_eq!(producer.write(b"hello"), 5);
//! assert_eq!(producer.free_space(), 3);
//!
//! let mut buf = [0u8; 8];
//! assert_eq!(consumer.read(&mut buf), 5);
//! assert_eq!(&buf[..5], b"hello");
//! # Ok::<(), dataport::DataportError>(())
//! ```
//!
//! ### Zero-copy writes
//!
//! ```rust
//! # use dataport::{region_size_for, CircularByteBuffer, Consumer, OverflowPlacement};
//! # let placement = OverflowPlacement::Internal;
//! # let mut producer = CircularByteBuffer::new(region_size_for(16, placement), placement)?;
//! let window = producer.write_contiguous();
//! window[..3].copy_from_slice(b"abc");
//! producer.commit(3)?;
//! assert_eq!(producer.occupied(), 3);
//! # Ok::<(), dataport::DataportError>(())
//! ```
//!
//! ### Overflow
//!
//! The flag is only ever set by the driver and is never cleared by it. With
//! [`OverflowPlacement::LastByte`] the consumer sees it and may reset it:
//!
//! ```rust
//! # use dataport::{region_size_for, CircularByteBuffer, Consumer, OverflowPlacement};
//! # let placement = OverflowPlacement::LastByte;
//! # let mut producer = CircularByteBuffer::new(region_size_for(8, placement), placement)?;
//! # let consumer = Consumer::attach(&producer)?;
//! producer.set_overflow();
//! assert_eq!(consumer.is_overflow(), Some(true));
//! consumer.clear_overflow()?;
//! assert!(!producer.is_overflow());
//! # Ok::<(), dataport::DataportError>(())
//! ```
//!
//! ## Notifications
//!
//! ```rust
//! use dataport::Notification;
//!
//! let driver_side = Notification::new()?;
//! let app_side = driver_side.try_clone()?;
//! driver_side.notify()?;
//! driver_side.notify()?;
//! app_side.wait()?; // both signals are consumed by one wait
//! # Ok::<(), dataport::DataportError>(())
//! ```

pub use common::{region_size_for, OverflowPlacement};
pub use consumer::Consumer;
pub use error::DataportError;
pub use port::OutboundPort;
pub use producer::CircularByteBuffer;
pub use sync::notification::Notification;

pub(crate) mod common;
pub mod consumer;
pub mod error;
#[cfg(all(test, feature = "loom"))]
pub(crate) mod loom;
pub(crate) mod memory;
pub mod port;
pub(crate) mod producer;
pub(crate) mod ringbuf;
pub(crate) mod sync;
mod trace_macro;
