//! Correlation keys routing packets to their flow record.
//!
//! A key packs the validated source address and a port into one fixed-width
//! integer: the address occupies bits 16..48, the port bits 0..16. Fixed
//! offsets mean two distinct (address, port) pairs can never collide, which
//! a variable-width concatenation cannot guarantee.

use crate::{addr::NumericAddr, packet::PacketMeta};

const PORT_BITS: u32 = 16;

/// Fixed-width packed key identifying one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey(u64);

impl FlowKey {
    /// Pack an address and port into a key.
    pub const fn new(addr: NumericAddr, port: u16) -> Self {
        Self(((addr.value() as u64) << PORT_BITS) | port as u64)
    }

    /// Key for the flow a packet belongs to: its source address and port.
    pub fn for_packet(packet: &PacketMeta) -> Self {
        Self::new(packet.saddr, packet.sport)
    }

    /// Key for the flow of the *original* probe: the packet's source
    /// address combined with the probe's port instead of the packet's own.
    /// Used to route replies arriving from an unexpected ephemeral port
    /// back to the entry that tracks them.
    pub fn with_parent_port(packet: &PacketMeta, parent_sport: u16) -> Self {
        Self::new(packet.saddr, parent_sport)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}
