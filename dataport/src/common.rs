// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Shared-region layout and small internal helpers.

use crate::sync::AtomicU64;
use crossbeam::utils::CachePadded;

#[inline]
#[cold]
fn cold() {}

#[inline(always)]
pub(crate) fn unlikely(b: bool) -> bool {
    if b {
        cold();
    }
    b
}

/// Index block at the start of an inbound dataport.
///
/// Both positions advance monotonically and are reduced modulo the ring
/// capacity only when addressing the payload. `write_pos` belongs to the
/// producer, `read_pos` to the consumer; each side only ever loads the
/// other's index.
#[repr(C)]
pub(crate) struct Header {
    pub(crate) write_pos: CachePadded<AtomicU64>,
    pub(crate) read_pos: CachePadded<AtomicU64>,
}

impl Header {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Default for Header {
    fn default() -> Self {
        Header {
            write_pos: CachePadded::new(AtomicU64::new(0)),
            read_pos: CachePadded::new(AtomicU64::new(0)),
        }
    }
}

pub(crate) const HEADER_SIZE: usize = std::mem::size_of::<Header>();
pub(crate) const HEADER_ALIGN: usize = std::mem::align_of::<Header>();

/// Where the sticky overflow byte of an inbound dataport lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum OverflowPlacement {
    /// The final byte of the region is the flag, visible to the consumer.
    #[default]
    LastByte,
    /// The whole region is ring storage and the flag stays with the producer.
    Internal,
}

impl OverflowPlacement {
    pub(crate) fn reserved(self) -> usize {
        match self {
            OverflowPlacement::LastByte => 1,
            OverflowPlacement::Internal => 0,
        }
    }
}

/// Total region size needed for a ring of `capacity` payload bytes.
pub fn region_size_for(capacity: usize, placement: OverflowPlacement) -> usize {
    HEADER_SIZE + capacity + placement.reserved()
}
